//! Backing file manager: the one open handle to the host file that backs
//! the virtual block device.
//!
//! The handle is core-owned behind a reader-writer lock and handed out as
//! `Arc<File>` clones. Workers resolve their clone at submit time, so a
//! concurrent `set` only drops the old `Arc`; in-flight I/O keeps the old
//! file alive until it finishes. `close` is the driver-unload path: the
//! slot empties for good and later lookups fail not-ready.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use log::info;

use crate::{Error, Result};

// Shortest accepted path: 3 UTF-16 units.
const MIN_PATH_BYTES: usize = 6;

#[derive(Default)]
struct Slot {
    file: Option<Arc<File>>,
    closed: bool,
}

#[derive(Default)]
pub struct Backing {
    slot: RwLock<Slot>,
}

impl Backing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new backing file from a UTF-16LE path buffer and install it,
    /// dropping any previous handle. Open errors propagate verbatim.
    pub fn set_from_utf16(&self, raw: &[u8]) -> Result<()> {
        let path = decode_utf16_path(raw)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let replaced = {
            let mut slot = self.slot.write().unwrap();
            if slot.closed {
                return Err(Error::DeviceNotReady);
            }
            slot.file.replace(Arc::new(file)).is_some()
        };
        info!(
            "vblk backing {} {}",
            if replaced { "replaced with" } else { "set to" },
            path.display()
        );
        Ok(())
    }

    pub fn get(&self) -> Result<Arc<File>> {
        let slot = self.slot.read().unwrap();
        slot.file.clone().ok_or(Error::DeviceNotReady)
    }

    pub fn is_ready(&self) -> bool {
        let slot = self.slot.read().unwrap();
        slot.file.is_some() && !slot.closed
    }

    /// Driver-unload path. Queued work that has not started yet observes
    /// this and completes not-ready instead of touching a dead handle.
    pub fn close(&self) {
        let mut slot = self.slot.write().unwrap();
        slot.file = None;
        slot.closed = true;
    }
}

fn decode_utf16_path(raw: &[u8]) -> Result<PathBuf> {
    if raw.len() < MIN_PATH_BYTES || raw.len() % 2 != 0 {
        return Err(Error::InvalidParameter);
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    // Tolerate a trailing NUL the way a C caller would send one.
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    let s = String::from_utf16(&units[..end]).map_err(|_| Error::InvalidParameter)?;
    if s.is_empty() {
        return Err(Error::InvalidParameter);
    }
    Ok(PathBuf::from(s))
}

/// Encode a path string the way callers hand it to SET_BACKING.
pub fn encode_utf16_path(path: &str) -> Vec<u8> {
    path.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
