//! Virtual TTY engine: the host ends of the two console byte rings.
//!
//! The host produces into TX (host -> guest) and consumes from RX
//! (guest -> host); the guest front-end holds the opposite cursor of
//! each. Byte-stream semantics, no framing; partial transfers are normal.

use crate::region::SharedRegion;
use crate::{Error, Result};

/// Copy console bytes toward the guest. Returns bytes accepted, 0 when
/// the ring is full.
pub(crate) fn push(region: &SharedRegion, input: &[u8]) -> Result<usize> {
    if input.is_empty() {
        return Err(Error::InvalidParameter);
    }
    let tx = region.vtty_tx().ok_or(Error::InvalidParameter)?;
    Ok(tx.push(input))
}

/// Drain console bytes the guest produced. Returns bytes read, 0 when
/// the ring is empty.
pub(crate) fn pull(region: &SharedRegion, out: &mut [u8]) -> Result<usize> {
    if out.is_empty() {
        return Err(Error::InvalidParameter);
    }
    let rx = region.vtty_rx().ok_or(Error::InvalidParameter)?;
    Ok(rx.pull(out))
}
