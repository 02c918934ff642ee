//! Request/completion surface of the dispatcher.
//!
//! A dispatch either completes in place (`Done`) or goes pending and
//! completes later from a worker (`Pending`). Exactly one completion is
//! produced per dispatch either way.

use crossbeam::channel::Receiver;

use crate::{Error, Result};

/// How a request carries its buffers, mirroring the device's transfer
/// methods: `Buffered` is the system-copied in/out pair, the `Direct`
/// variants hand the bulk data over as a caller mapping alias.
pub enum Ioctl<'a> {
    Buffered { input: &'a [u8], out_max: usize },
    DirectIn { input: &'a [u8], data: &'a [u8] },
    DirectOut { input: &'a [u8], data: &'a mut [u8] },
}

impl<'a> Ioctl<'a> {
    /// Zero-buffer request, for opcodes that take none.
    pub fn none() -> Self {
        Ioctl::Buffered {
            input: &[],
            out_max: 0,
        }
    }
}

/// What a completed request reports: a transfer count plus, for buffered
/// reads, the bytes produced into the output buffer.
#[derive(Debug, Default)]
pub struct Reply {
    pub info: usize,
    pub data: Vec<u8>,
}

impl Reply {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn moved(info: usize) -> Self {
        Self { info, data: Vec::new() }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { info: data.len(), data }
    }
}

/// Handle to a request that went pending. Dropping it without waiting is
/// allowed; the completion is still produced and discarded.
pub struct PendingIo {
    pub(crate) rx: Receiver<Result<Reply>>,
}

impl PendingIo {
    /// Block until the worker completes the request.
    pub fn wait(self) -> Result<Reply> {
        // A dead channel means the pool went away mid-flight; surface it
        // as a cancel rather than panicking.
        self.rx.recv().unwrap_or(Err(Error::Cancelled))
    }

    pub fn try_wait(&self) -> Option<Result<Reply>> {
        self.rx.try_recv().ok()
    }
}

pub enum Completion {
    Done(Result<Reply>),
    Pending(PendingIo),
}

impl Completion {
    /// Collapse to the final result, blocking on pending completions.
    pub fn wait(self) -> Result<Reply> {
        match self {
            Completion::Done(r) => r,
            Completion::Pending(p) => p.wait(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Completion::Pending(_))
    }
}
