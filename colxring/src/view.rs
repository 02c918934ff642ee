//! In-place views over a live shared mapping.
//!
//! Every field that crosses the host/guest boundary is accessed through an
//! atomic reference materialized from the raw mapping pointer. Cursor
//! publication follows the single-writer rule: the producer owns `head`
//! (resp. `prod`), the consumer owns `tail` (resp. `cons`), and each side
//! release-stores its own cursor after the payload bytes are in place and
//! acquire-loads the other side's.

use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::{
    VblkSlot, VttyCtrl, COLX_VER_1, VBLK_DATA_MAX, VBLK_DATA_OFF, VBLK_RING_OFF, VBLK_SLOTS_OFF,
    VTTY_CAP,
};

/// View of the `RingHdr` at the base of the mapping.
///
/// Construction contract: `base` points at least `RingHdr::SIZE` readable
/// and writable bytes, 8-aligned, valid for the view's lifetime.
pub struct HdrView {
    base: *mut u8,
}

// Safety: all access goes through atomics; the pointer itself is never
// re-seated after construction.
unsafe impl Send for HdrView {}
unsafe impl Sync for HdrView {}

impl HdrView {
    pub unsafe fn from_ptr(base: *mut u8) -> Self {
        Self { base }
    }

    fn u32_at(&self, off: usize) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.add(off).cast()) }
    }

    fn tick(&self) -> &AtomicU64 {
        unsafe { AtomicU64::from_ptr(self.base.add(8).cast()) }
    }

    pub fn init(&self) {
        self.u32_at(0).store(COLX_VER_1, Ordering::Relaxed);
        self.u32_at(4).store(0, Ordering::Relaxed);
        self.tick().store(0, Ordering::Relaxed);
        self.u32_at(16).store(0, Ordering::Relaxed);
        self.u32_at(20).store(0, Ordering::Release);
    }

    pub fn ver(&self) -> u32 {
        self.u32_at(0).load(Ordering::Acquire)
    }

    pub fn flags(&self) -> u32 {
        self.u32_at(4).load(Ordering::Acquire)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick().load(Ordering::Acquire)
    }

    /// Returns the new count.
    pub fn bump_tick(&self) -> u64 {
        self.tick().fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn ping_req(&self) -> u32 {
        self.u32_at(16).load(Ordering::Acquire)
    }

    pub fn set_ping_req(&self, v: u32) {
        self.u32_at(16).store(v, Ordering::Release);
    }

    pub fn ping_resp(&self) -> u32 {
        self.u32_at(20).load(Ordering::Acquire)
    }

    pub fn set_ping_resp(&self, v: u32) {
        self.u32_at(20).store(v, Ordering::Release);
    }
}

/// View of the VBLK control block, slot array, and data arena.
///
/// Construction contract: `base` is the region base, valid for `size`
/// bytes; the caller has checked `size >= VBLK_SLOTS_OFF` before touching
/// cursors, and the arena helpers re-check their own bounds.
pub struct VblkRingView {
    base: *mut u8,
    size: usize,
}

// Safety: cursor and status fields go through atomics; arena copies are
// bounds-checked and the host is the only consumer-side writer.
unsafe impl Send for VblkRingView {}
unsafe impl Sync for VblkRingView {}

impl VblkRingView {
    pub unsafe fn from_region(base: *mut u8, size: usize) -> Self {
        Self { base, size }
    }

    fn ctrl_u32(&self, off: usize) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.add(VBLK_RING_OFF + off).cast()) }
    }

    /// Whole ring rectangle (ctrl + slot array) fits in the mapping?
    pub fn ring_fits(&self, cap: u32) -> bool {
        self.size >= VBLK_SLOTS_OFF + cap as usize * VblkSlot::SIZE
    }

    /// Install `cap` and zero the slot array, the way the host does at map
    /// time. Slot zeroing is skipped when the mapping is too small to hold
    /// the array, matching the size-guarded init of the reference layout.
    pub fn init(&self, cap: u32) {
        self.ctrl_u32(0).store(0, Ordering::Relaxed);
        self.ctrl_u32(4).store(0, Ordering::Relaxed);
        self.ctrl_u32(8).store(cap, Ordering::Relaxed);
        self.ctrl_u32(12)
            .store(VblkSlot::SIZE as u32, Ordering::Release);
        if self.ring_fits(cap) {
            unsafe {
                ptr::write_bytes(
                    self.base.add(VBLK_SLOTS_OFF),
                    0,
                    cap as usize * VblkSlot::SIZE,
                );
            }
        }
    }

    pub fn prod(&self) -> u32 {
        self.ctrl_u32(0).load(Ordering::Acquire)
    }

    /// Producer-side publish; only the guest front-end calls this.
    pub fn set_prod(&self, v: u32) {
        self.ctrl_u32(0).store(v, Ordering::Release);
    }

    pub fn cons(&self) -> u32 {
        self.ctrl_u32(4).load(Ordering::Acquire)
    }

    pub fn set_cons(&self, v: u32) {
        self.ctrl_u32(4).store(v, Ordering::Release);
    }

    pub fn cap(&self) -> u32 {
        self.ctrl_u32(8).load(Ordering::Acquire)
    }

    pub fn slot_size(&self) -> u32 {
        self.ctrl_u32(12).load(Ordering::Acquire)
    }

    fn slot_ptr(&self, idx: u32) -> *mut u8 {
        unsafe { self.base.add(VBLK_SLOTS_OFF + idx as usize * VblkSlot::SIZE) }
    }

    /// Copy slot `idx` out of the ring. The caller has acquire-loaded
    /// `prod` past this index, so the payload bytes are visible.
    pub fn slot(&self, idx: u32) -> VblkSlot {
        let mut bytes = [0u8; VblkSlot::SIZE];
        unsafe {
            ptr::copy_nonoverlapping(self.slot_ptr(idx), bytes.as_mut_ptr(), VblkSlot::SIZE);
        }
        VblkSlot::parse(&bytes).unwrap_or_default()
    }

    /// Copy a whole slot into the ring (producer side).
    pub fn set_slot(&self, idx: u32, slot: &VblkSlot) {
        let bytes = slot.to_bytes();
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.slot_ptr(idx), VblkSlot::SIZE);
        }
    }

    /// Release-publish a completion status; any arena bytes written for the
    /// slot happen-before this store.
    pub fn set_slot_status(&self, idx: u32, status: u8) {
        let p = unsafe { self.slot_ptr(idx).add(VblkSlot::STATUS_OFF) };
        unsafe { AtomicU8::from_ptr(p) }.store(status, Ordering::Release);
    }

    pub fn slot_status(&self, idx: u32) -> u8 {
        let p = unsafe { self.slot_ptr(idx).add(VblkSlot::STATUS_OFF) };
        unsafe { AtomicU8::from_ptr(p) }.load(Ordering::Acquire)
    }

    /// Does `[data_off, data_off+len)` stay inside both the nominal arena
    /// and the actual mapping?
    pub fn arena_ok(&self, data_off: u32, len: u32) -> bool {
        let end = match data_off.checked_add(len) {
            Some(e) => e,
            None => return false,
        };
        end <= VBLK_DATA_MAX && VBLK_DATA_OFF + end as usize <= self.size
    }

    /// Copy `dst.len()` bytes out of the data arena. False when the range
    /// escapes the arena or the mapping.
    pub fn read_arena(&self, data_off: u32, dst: &mut [u8]) -> bool {
        let len = dst.len() as u32;
        if !self.arena_ok(data_off, len) {
            return false;
        }
        unsafe {
            ptr::copy_nonoverlapping(
                self.base.add(VBLK_DATA_OFF + data_off as usize),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        true
    }

    /// Copy `src` into the data arena. False when out of range.
    pub fn write_arena(&self, data_off: u32, src: &[u8]) -> bool {
        let len = src.len() as u32;
        if !self.arena_ok(data_off, len) {
            return false;
        }
        unsafe {
            ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.base.add(VBLK_DATA_OFF + data_off as usize),
                src.len(),
            );
        }
        true
    }
}

/// Lock-free SPSC byte ring, one per VTTY direction.
///
/// Construction contract: `base` points at a `VttyCtrl` followed by the
/// ring's data bytes, 4-aligned, valid for the view's lifetime. Two
/// concurrent pushes (or pulls) on the same ring are a protocol violation;
/// one pusher plus one puller is the supported shape.
pub struct VttyView {
    base: *mut u8,
}

// Safety: cursors go through atomics and each cursor has a single writer.
unsafe impl Send for VttyView {}
unsafe impl Sync for VttyView {}

impl VttyView {
    pub unsafe fn from_ptr(base: *mut u8) -> Self {
        Self { base }
    }

    fn head(&self) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.cast()) }
    }

    fn tail(&self) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.add(4).cast()) }
    }

    fn cap_field(&self) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.add(8).cast()) }
    }

    fn buf(&self) -> *mut u8 {
        unsafe { self.base.add(VttyCtrl::SIZE) }
    }

    pub fn init(&self, cap: u32) {
        debug_assert!(cap.is_power_of_two());
        self.head().store(0, Ordering::Relaxed);
        self.tail().store(0, Ordering::Relaxed);
        self.cap_field().store(cap, Ordering::Release);
    }

    /// Zero means the ring was never initialized; the default applies.
    pub fn cap(&self) -> u32 {
        match self.cap_field().load(Ordering::Acquire) {
            0 => VTTY_CAP,
            c => c,
        }
    }

    pub fn used(&self) -> u32 {
        let cap = self.cap();
        self.head()
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail().load(Ordering::Acquire))
            & (cap - 1)
    }

    /// Room left for the producer; one byte stays reserved so a full ring
    /// is distinguishable from an empty one.
    pub fn free(&self) -> u32 {
        self.cap() - self.used() - 1
    }

    /// Producer op: copy up to `free()` bytes in, splitting at the wrap
    /// boundary, then release-publish the new head. Returns bytes written;
    /// 0 when full. Never blocks.
    pub fn push(&self, src: &[u8]) -> usize {
        let cap = self.cap();
        let mask = cap - 1;
        let head = self.head().load(Ordering::Relaxed);
        let tail = self.tail().load(Ordering::Acquire);
        let used = head.wrapping_sub(tail) & mask;
        let free = cap - used - 1;
        let n = src.len().min(free as usize);
        if n == 0 {
            return 0;
        }
        let at = (head & mask) as usize;
        let first = n.min((cap as usize) - at);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.buf().add(at), first);
            if n > first {
                ptr::copy_nonoverlapping(src.as_ptr().add(first), self.buf(), n - first);
            }
        }
        self.head()
            .store(head.wrapping_add(n as u32) & mask, Ordering::Release);
        n
    }

    /// Consumer op, symmetric to `push`. Returns bytes read; 0 when empty.
    pub fn pull(&self, dst: &mut [u8]) -> usize {
        let cap = self.cap();
        let mask = cap - 1;
        let head = self.head().load(Ordering::Acquire);
        let tail = self.tail().load(Ordering::Relaxed);
        let used = head.wrapping_sub(tail) & mask;
        let n = dst.len().min(used as usize);
        if n == 0 {
            return 0;
        }
        let at = (tail & mask) as usize;
        let first = n.min((cap as usize) - at);
        unsafe {
            ptr::copy_nonoverlapping(self.buf().add(at), dst.as_mut_ptr(), first);
            if n > first {
                ptr::copy_nonoverlapping(self.buf(), dst.as_mut_ptr().add(first), n - first);
            }
        }
        self.tail()
            .store(tail.wrapping_add(n as u32) & mask, Ordering::Release);
        n
    }
}
