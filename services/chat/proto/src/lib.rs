//! Typed application messages and their CBOR codec for parley chat.
//!
//! One [`Message`] maps to one plaintext record carried by `chat-wire`.
//! The encoding is self-describing CBOR: decoding an encoded message
//! reproduces the identical variant and field values, including empty
//! strings and zero-length file payloads. Buffers that do not parse into a
//! known message fail cleanly with [`ProtoError::Malformed`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod message;

// Re-export main types
pub use error::ProtoError;
pub use message::{Message, Status};
