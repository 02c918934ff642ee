use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub mod ioctl;
pub mod view;

// NOTES:
// - This crate is the wire contract between the host core and the guest
// front-end drivers: every struct here lives either inside the shared
// mapping or inside an IOCTL buffer, so everything is repr(C) with
// little-endian alignment-1 field types and explicit padding. Sizes and
// offsets are load-bearing; the tests at the bottom pin them.
// - The guest publishes VBLK slots and its RX bytes directly through its
// view of the mapping, so cursor and status fields are only ever touched
// through the atomic views in `view` once a region is live. The plain
// structs exist for initialization, IOCTL parsing, and copying slots out.

pub const PAGE_SIZE: usize = 4096;
pub const SECTOR_SIZE: u32 = 512;

pub const COLX_VER_1: u32 = 1;

/* Slot status codes, aligned loosely with errno */
pub const ST_OK: u8 = 0;
pub const ST_EINVAL: u8 = 1;
pub const ST_EIO: u8 = 5;
pub const ST_ENOSPC: u8 = 28;
pub const ST_ETIME: u8 = 62;

pub const OP_READ: u8 = 0;
pub const OP_WRITE: u8 = 1;

/* Offsets within the shared mapping */
pub const VBLK_RING_OFF: usize = 0x1000;
pub const VBLK_SLOTS_OFF: usize = VBLK_RING_OFF + RingCtrl::SIZE;
pub const VBLK_DATA_OFF: usize = 0x4000;
pub const VBLK_SLOT_DATA_STRIDE: u32 = 128 * 1024;
/// Ring capacity installed by the host at map time.
pub const VBLK_RING_CAP: u32 = 8;
pub const VBLK_DATA_MAX: u32 = VBLK_SLOT_DATA_STRIDE * VBLK_RING_CAP;

pub const VTTY_TX_OFF: usize = 0x40000; /* host -> guest */
pub const VTTY_RX_OFF: usize = 0x50000; /* guest -> host */
pub const VTTY_CAP: u32 = 64 * 1024;
/// Bytes a VTTY ring occupies in the mapping: cursor block plus data.
pub const VTTY_RING_BYTES: usize = VttyCtrl::SIZE + VTTY_CAP as usize;

/// Header at offset 0 of the shared mapping.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RingHdr {
    pub ver: U32,
    pub flags: U32,
    pub tick_count: U64,
    pub ping_req: U32,
    pub ping_resp: U32,
}

impl RingHdr {
    pub const SIZE: usize = size_of::<Self>();
}

/// VBLK ring control block at VBLK_RING_OFF.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RingCtrl {
    pub prod: U32,
    pub cons: U32,
    pub cap: U32,
    pub slot_size: U32,
}

impl RingCtrl {
    pub const SIZE: usize = size_of::<Self>();
}

// The C declaration has a 4-byte natural-alignment gap before lba; with
// alignment-1 field types that gap must be spelled out.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct VblkSlot {
    pub id: U64,
    pub op: u8,
    pub status: u8,
    pub _rsvd: U16,
    pub _pad: U32,
    pub lba: U64,
    pub len: U32,
    pub data_off: U32,
}

impl VblkSlot {
    pub const SIZE: usize = size_of::<Self>();
    /// Byte offset of the status field within a slot.
    pub const STATUS_OFF: usize = 9;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes.get(..Self::SIZE)?).ok()
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

/// Cursor block at the head of each VTTY ring; ring bytes follow directly.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct VttyCtrl {
    pub head: U32,
    pub tail: U32,
    pub cap: U32,
    pub _rsvd: U32,
}

impl VttyCtrl {
    pub const SIZE: usize = size_of::<Self>();
}
