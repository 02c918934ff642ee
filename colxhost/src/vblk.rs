//! Virtual block engine: validation, the asynchronous worker pool behind
//! buffered submits, the synchronous direct read/write paths, and the
//! tick-driven scan of the in-region slot ring.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use log::{trace, warn};

use colxring::view::VblkRingView;
use colxring::{
    VblkSlot, OP_READ, OP_WRITE, SECTOR_SIZE, ST_EINVAL, ST_EIO, ST_ENOSPC, ST_ETIME, ST_OK,
    VBLK_SLOT_DATA_STRIDE,
};

use crate::backing::Backing;
use crate::dispatch::Reply;
use crate::region::SharedRegion;
use crate::{Error, Result};

/// Cap on a single transfer, buffered or direct.
pub const MAX_XFER: u32 = 128 * 1024;

/// Sector-addressed length checks shared by every VBLK variant.
pub fn validate(lba: u64, len: u32) -> Result<()> {
    if len == 0 || len > MAX_XFER || len % SECTOR_SIZE != 0 {
        return Err(Error::InvalidParameter);
    }
    byte_offset(lba)?;
    Ok(())
}

fn byte_offset(lba: u64) -> Result<u64> {
    lba.checked_mul(SECTOR_SIZE as u64)
        .filter(|off| *off <= i64::MAX as u64)
        .ok_or(Error::InvalidParameter)
}

/// Outstanding-request accounting for one connection. Cleanup flips
/// `closing` and then blocks until the count drains, so no completion can
/// run after the connection state is gone.
pub(crate) struct InFlight {
    count: Mutex<usize>,
    cv: Condvar,
    closing: AtomicBool,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(0),
            cv: Condvar::new(),
            closing: AtomicBool::new(false),
        })
    }

    pub fn guard(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock().unwrap() += 1;
        InFlightGuard {
            inner: Arc::clone(self),
        }
    }

    pub fn closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn begin_close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn drain(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cv.wait(count).unwrap();
        }
    }
}

pub(crate) struct InFlightGuard {
    inner: Arc<InFlight>,
}

impl InFlightGuard {
    fn closing(&self) -> bool {
        self.inner.closing()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        *self.inner.count.lock().unwrap() -= 1;
        self.inner.cv.notify_all();
    }
}

/// One queued buffered submit. The write payload was captured into owned
/// memory at dispatch, so the caller's buffer is reusable immediately.
pub(crate) struct Work {
    pub op: u8,
    pub lba: u64,
    pub len: u32,
    pub payload: Option<Vec<u8>>,
    pub file: Arc<File>,
    pub backing: Arc<Backing>,
    pub done: Sender<Result<Reply>>,
    pub guard: InFlightGuard,
}

fn run(work: &Work) -> Result<Reply> {
    if work.guard.closing() {
        return Err(Error::Cancelled);
    }
    // A backing reset between submit and service fails the request even
    // though the Arc still holds the old file open.
    if !work.backing.is_ready() {
        return Err(Error::DeviceNotReady);
    }
    let off = byte_offset(work.lba)?;
    match work.op {
        OP_READ => {
            let mut buf = vec![0u8; work.len as usize];
            let n = work.file.read_at(&mut buf, off)?;
            buf.truncate(n);
            Ok(Reply::with_data(buf))
        }
        OP_WRITE => {
            let payload = work.payload.as_deref().unwrap_or(&[]);
            work.file.write_all_at(payload, off)?;
            Ok(Reply::empty())
        }
        op => {
            warn!("vblk worker saw op {op} past submit validation");
            Err(Error::InvalidParameter)
        }
    }
}

pub(crate) struct Pool {
    sender: Option<Sender<Work>>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = channel::bounded::<Work>(workers * 2);
        let handles = (0..workers).map(|i| spawn_worker(i, rx.clone())).collect();
        Self {
            sender: Some(tx),
            handles,
        }
    }

    pub fn sender(&self) -> &Sender<Work> {
        self.sender.as_ref().unwrap()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn spawn_worker(id: usize, input: Receiver<Work>) -> JoinHandle<()> {
    thread::spawn(move || {
        for work in input.iter() {
            let result = run(&work);
            if work.done.send(result).is_err() {
                // Caller dropped its pending handle; completion still
                // happened, nobody is listening.
                trace!("vblk worker {id}: completion receiver gone");
            }
        }
    })
}

/// Synchronous read into the caller's aliased destination buffer.
pub(crate) fn direct_read(file: &File, lba: u64, len: u32, data: &mut [u8]) -> Result<usize> {
    validate(lba, len)?;
    if data.len() < len as usize {
        return Err(Error::BufferTooSmall);
    }
    let n = file.read_at(&mut data[..len as usize], byte_offset(lba)?)?;
    Ok(n)
}

/// Synchronous write from the caller's aliased source buffer.
pub(crate) fn direct_write(file: &File, lba: u64, len: u32, data: &[u8]) -> Result<()> {
    validate(lba, len)?;
    if data.len() < len as usize {
        return Err(Error::BufferTooSmall);
    }
    file.write_all_at(&data[..len as usize], byte_offset(lba)?)?;
    Ok(())
}

fn io_slot_status(err: &std::io::Error) -> u8 {
    if err.kind() == std::io::ErrorKind::StorageFull {
        ST_ENOSPC
    } else {
        ST_EIO
    }
}

fn service_slot(ring: &VblkRingView, backing: &Backing, slot: &VblkSlot) -> u8 {
    let len = slot.len.get();
    let data_off = slot.data_off.get();
    if len == 0 || len > VBLK_SLOT_DATA_STRIDE || len % SECTOR_SIZE != 0 {
        return ST_EINVAL;
    }
    if !ring.arena_ok(data_off, len) {
        return ST_EINVAL;
    }
    let Some(off) = slot
        .lba
        .get()
        .checked_mul(SECTOR_SIZE as u64)
        .filter(|o| *o <= i64::MAX as u64)
    else {
        return ST_EINVAL;
    };
    // The guest keeps waiting on a slot with no backing behind it; time it
    // out rather than leaving it pending forever.
    let Ok(file) = backing.get() else {
        return ST_ETIME;
    };
    match slot.op {
        OP_READ => {
            let mut buf = vec![0u8; len as usize];
            match file.read_at(&mut buf, off) {
                Ok(n) => {
                    buf[n..].fill(0);
                    if ring.write_arena(data_off, &buf) {
                        ST_OK
                    } else {
                        ST_EINVAL
                    }
                }
                Err(e) => io_slot_status(&e),
            }
        }
        OP_WRITE => {
            let mut buf = vec![0u8; len as usize];
            if !ring.read_arena(data_off, &mut buf) {
                return ST_EINVAL;
            }
            match file.write_all_at(&buf, off) {
                Ok(()) => ST_OK,
                Err(e) => io_slot_status(&e),
            }
        }
        _ => ST_EINVAL,
    }
}

/// Drain guest-published slots in `[cons, prod)`, completing each with a
/// release-ordered status store before `cons` is published. Runs at tick
/// time; bounded by one lap of the ring per call.
pub(crate) fn scan_ring(region: &SharedRegion, backing: &Backing) {
    let Some(ring) = region.vblk_ring() else {
        return;
    };
    let cap = ring.cap();
    if cap == 0 || !ring.ring_fits(cap) {
        return;
    }
    let prod = ring.prod();
    let mut cons = ring.cons();
    let mut lap = 0;
    while cons != prod && lap < cap {
        let idx = cons % cap;
        let slot = ring.slot(idx);
        let status = service_slot(&ring, backing, &slot);
        trace!("vblk slot {} id={} -> status {}", idx, slot.id.get(), status);
        ring.set_slot_status(idx, status);
        cons = cons.wrapping_add(1);
        ring.set_cons(cons);
        lap += 1;
    }
}
