//! Wire framing and authenticated stream encryption for parley chat.
//!
//! This crate turns an unreliable byte stream into discrete authenticated
//! plaintext records and back. It knows nothing about message semantics;
//! the payload of every frame is an opaque buffer for the layer above.
//!
//! ## Features
//!
//! - **Length-Prefixed Framing**: frames are consumed only once complete,
//!   tolerant of arbitrary partial arrivals
//! - **Authenticated Encryption**: per-record random nonce, SHA-256
//!   block-counter keystream, HMAC-SHA256 tag verified in constant time
//! - **Zero-Copy Buffers**: uses `Bytes`/`BytesMut` for the receive path
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 record_len (BE)  | length of bytes that follow|
//! +----------------------+----------------------------+
//! | magic (4B) "ENC1"    | scheme version tag         |
//! +----------------------+----------------------------+
//! | nonce (16B)          | fresh random per record    |
//! +----------------------+----------------------------+
//! | ciphertext           | same length as plaintext   |
//! +----------------------+----------------------------+
//! | tag (32B)            | HMAC-SHA256(nonce‖cipher)  |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;

// Re-export main types
pub use codec::{
    CipherKey, FrameCodec, MAGIC, MAX_FRAME_SIZE, MIN_RECORD_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::WireError;
