//! Message codec error types.

use thiserror::Error;

/// Message codec errors
#[derive(Error, Debug)]
pub enum ProtoError {
    /// Message encoding failed
    #[error("message encoding failed")]
    Encode,

    /// Buffer did not parse into a known message
    #[error("malformed message")]
    Malformed,
}
