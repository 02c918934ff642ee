//! IOCTL opcodes and buffer formats for the colinux2 control device.
//!
//! Codes are built CTL_CODE-style so they stay stable opaque identifiers;
//! callers only ever match on the eight named values.

use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

const METHOD_BUFFERED: u32 = 0;
const METHOD_IN_DIRECT: u32 = 1;
const METHOD_OUT_DIRECT: u32 = 2;
const FILE_DEVICE_UNKNOWN: u32 = 0x22;

const fn ctl_code(function: u32, method: u32) -> u32 {
    (FILE_DEVICE_UNKNOWN << 16) | (function << 2) | method
}

pub const IOCTL_MAP_SHARED: u32 = ctl_code(0x800, METHOD_BUFFERED);
pub const IOCTL_RUN_TICK: u32 = ctl_code(0x801, METHOD_BUFFERED);
pub const IOCTL_VBLK_SUBMIT: u32 = ctl_code(0x802, METHOD_BUFFERED);
pub const IOCTL_VBLK_READ: u32 = ctl_code(0x803, METHOD_OUT_DIRECT);
pub const IOCTL_VBLK_WRITE: u32 = ctl_code(0x804, METHOD_IN_DIRECT);
pub const IOCTL_VBLK_SET_BACKING: u32 = ctl_code(0x805, METHOD_BUFFERED);
pub const IOCTL_VTTY_PUSH: u32 = ctl_code(0x806, METHOD_BUFFERED);
pub const IOCTL_VTTY_PULL: u32 = ctl_code(0x807, METHOD_BUFFERED);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    MapShared,
    RunTick,
    VblkSubmit,
    VblkRead,
    VblkWrite,
    VblkSetBacking,
    VttyPush,
    VttyPull,
}

impl Opcode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            IOCTL_MAP_SHARED => Some(Opcode::MapShared),
            IOCTL_RUN_TICK => Some(Opcode::RunTick),
            IOCTL_VBLK_SUBMIT => Some(Opcode::VblkSubmit),
            IOCTL_VBLK_READ => Some(Opcode::VblkRead),
            IOCTL_VBLK_WRITE => Some(Opcode::VblkWrite),
            IOCTL_VBLK_SET_BACKING => Some(Opcode::VblkSetBacking),
            IOCTL_VTTY_PUSH => Some(Opcode::VttyPush),
            IOCTL_VTTY_PULL => Some(Opcode::VttyPull),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Opcode::MapShared => IOCTL_MAP_SHARED,
            Opcode::RunTick => IOCTL_RUN_TICK,
            Opcode::VblkSubmit => IOCTL_VBLK_SUBMIT,
            Opcode::VblkRead => IOCTL_VBLK_READ,
            Opcode::VblkWrite => IOCTL_VBLK_WRITE,
            Opcode::VblkSetBacking => IOCTL_VBLK_SET_BACKING,
            Opcode::VttyPush => IOCTL_VTTY_PUSH,
            Opcode::VttyPull => IOCTL_VTTY_PULL,
        }
    }

    /// Direct opcodes carry their bulk data as a caller mapping rather
    /// than through the system buffer.
    pub fn is_direct(self) -> bool {
        matches!(self, Opcode::VblkRead | Opcode::VblkWrite)
    }
}

/// MAP_SHARED output buffer.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct MapInfoOut {
    pub user_base: U64,
    pub kernel_base: U64,
    pub size: U64,
    pub ver: U32,
    pub flags: U32,
    pub _rsvd: [u8; 8],
}

impl MapInfoOut {
    pub const SIZE: usize = size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes.get(..Self::SIZE)?).ok()
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

/// VBLK_SUBMIT input header; a write's payload follows immediately.
/// lba sits at byte offset 4, hence the alignment-1 field types.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SubmitHdr {
    pub op: u8,
    pub _rsvd: [u8; 3],
    pub lba: U64,
    pub len: U32,
}

impl SubmitHdr {
    pub const SIZE: usize = size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes.get(..Self::SIZE)?).ok()
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

/// Input header shared by the direct VBLK_READ / VBLK_WRITE paths.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RwHdr {
    pub lba: U64,
    pub len: U32,
    pub flags: U32,
}

impl RwHdr {
    pub const SIZE: usize = size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes.get(..Self::SIZE)?).ok()
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }
}
