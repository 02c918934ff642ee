//! Shared region sessions: one memfd-backed section per connection,
//! mapped twice so the caller view and the privileged view address the
//! same pages. Ring structures are initialized through the privileged
//! view at creation, each zone guarded by the mapped size.

use std::fs::File;

use log::trace;
use memmap2::{MmapMut, MmapOptions};
use rustix::fs::{memfd_create, MemfdFlags};

use colxring::view::{HdrView, VblkRingView, VttyView};
use colxring::{
    RingHdr, PAGE_SIZE, VBLK_RING_CAP, VBLK_SLOTS_OFF, VTTY_CAP, VTTY_RING_BYTES, VTTY_RX_OFF,
    VTTY_TX_OFF,
};

use crate::{Error, Result};

/// Upper bound on a single mapping: 256 MiB.
pub const MAX_MAP_PAGES: u32 = 65536;

/// Section allocation failures surface as a resource status; anything
/// else the OS reports passes through verbatim.
fn alloc_error(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::OutOfMemory {
        Error::InsufficientResources
    } else {
        Error::Io(err)
    }
}

pub struct SharedRegion {
    // Field order pins teardown order: views unmap before the section
    // closes.
    _user: MmapMut,
    _kernel: MmapMut,
    _section: File,
    user_base: *mut u8,
    kernel_base: *mut u8,
    size: usize,
}

// Safety: the raw base pointers never outlive the mappings they point
// into, and every cross-view field is accessed through the atomic views.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    pub fn create(pages: u32) -> Result<Self> {
        if pages == 0 || pages > MAX_MAP_PAGES {
            return Err(Error::InvalidParameter);
        }
        let size = pages as usize * PAGE_SIZE;

        let fd = memfd_create("colx-shared", MemfdFlags::CLOEXEC)
            .map_err(|e| alloc_error(e.into()))?;
        let section: File = fd.into();
        section.set_len(size as u64).map_err(alloc_error)?;

        // Two independent views of the same pages; stores through one are
        // loads through the other, subject to the views' atomics.
        let mut kernel =
            unsafe { MmapOptions::new().len(size).map_mut(&section) }.map_err(alloc_error)?;
        let mut user =
            unsafe { MmapOptions::new().len(size).map_mut(&section) }.map_err(alloc_error)?;
        let kernel_base = kernel.as_mut_ptr();
        let user_base = user.as_mut_ptr();

        let region = Self {
            _user: user,
            _kernel: kernel,
            _section: section,
            user_base,
            kernel_base,
            size,
        };
        region.init_layout();
        trace!("shared region created: {} pages at k={:p}", pages, kernel_base);
        Ok(region)
    }

    fn init_layout(&self) {
        if let Some(hdr) = self.hdr() {
            hdr.init();
        }
        if let Some(ring) = self.vblk_ring() {
            ring.init(VBLK_RING_CAP);
        }
        // Eager VTTY init; a zero cap field never escapes map_shared.
        for off in [VTTY_TX_OFF, VTTY_RX_OFF] {
            if let Some(ring) = self.vtty_at(off) {
                ring.init(VTTY_CAP);
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn user_base(&self) -> u64 {
        self.user_base as u64
    }

    pub fn kernel_base(&self) -> u64 {
        self.kernel_base as u64
    }

    /// Raw caller-view pointer; tests stand in for the guest through it.
    pub fn user_ptr(&self) -> *mut u8 {
        self.user_base
    }

    pub fn hdr(&self) -> Option<HdrView> {
        if self.size < RingHdr::SIZE {
            return None;
        }
        Some(unsafe { HdrView::from_ptr(self.kernel_base) })
    }

    /// VBLK ring view, or None when the mapping cannot hold the control
    /// block and slot cursors.
    pub fn vblk_ring(&self) -> Option<VblkRingView> {
        if self.size < VBLK_SLOTS_OFF {
            return None;
        }
        Some(unsafe { VblkRingView::from_region(self.kernel_base, self.size) })
    }

    fn vtty_at(&self, off: usize) -> Option<VttyView> {
        if self.size < off + VTTY_RING_BYTES {
            return None;
        }
        Some(unsafe { VttyView::from_ptr(self.kernel_base.add(off)) })
    }

    /// Host->guest ring, or None when the mapping is too small to hold it.
    pub fn vtty_tx(&self) -> Option<VttyView> {
        self.vtty_at(VTTY_TX_OFF)
    }

    /// Guest->host ring.
    pub fn vtty_rx(&self) -> Option<VttyView> {
        self.vtty_at(VTTY_RX_OFF)
    }

    /// Guest-side view of a ring, for exercising the opposite cursor.
    #[cfg(test)]
    pub(crate) fn guest_vtty(&self, off: usize) -> Option<VttyView> {
        if self.size < off + VTTY_RING_BYTES {
            return None;
        }
        Some(unsafe { VttyView::from_ptr(self.user_base.add(off)) })
    }
}
