//! Host-side core of the colinux2 cooperative guest environment: a
//! per-connection shared mapping, a ticking control channel, a virtual
//! block backend over a host file, and a pair of virtual-TTY byte rings,
//! all driven through an IOCTL-style dispatch surface.

pub mod backing;
pub mod device;
pub mod dispatch;
pub mod region;
pub mod vblk;
pub mod vtty;

pub use backing::Backing;
pub use device::{Connection, Device};
pub use dispatch::{Completion, Ioctl, PendingIo, Reply};

/// Status taxonomy of the dispatch surface. Backing-file and mapping
/// errors pass through as `Io`; everything else is a protocol-level
/// status. Never retried internally; the first failure surfaces.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid device request")]
    InvalidDeviceRequest,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("device not ready")]
    DeviceNotReady,
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
