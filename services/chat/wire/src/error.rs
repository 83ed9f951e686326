//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors.
///
/// Every variant marks the decoded frame as untrusted. Because frame
/// boundaries cannot be trusted past a bad frame, callers are expected to
/// discard their entire receive buffer when one of these is returned.
#[derive(Error, Debug)]
pub enum WireError {
    /// Length prefix exceeds the maximum accepted frame size
    #[error("frame size limit exceeded: {0}")]
    Oversized(usize),

    /// Record shorter than magic + nonce + tag
    #[error("record truncated at {0} bytes")]
    Truncated(usize),

    /// Record does not begin with the scheme magic
    #[error("bad record magic")]
    BadMagic,

    /// Authentication tag did not verify
    #[error("authentication tag mismatch")]
    TagMismatch,
}
