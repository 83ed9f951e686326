//! Frame encoding and authenticated decryption.
//!
//! The cipher is a stream construction: keystream block `i` is
//! `SHA-256(key ‖ nonce ‖ i:u32(BE))`, XORed over the data, with an
//! HMAC-SHA256 tag over `nonce ‖ ciphertext`. The layout is fixed so that
//! independent implementations of the protocol stay wire-compatible.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::WireError;

/// Fixed tag identifying scheme version 1.
pub const MAGIC: [u8; 4] = *b"ENC1";

/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 16;

/// Authentication tag size in bytes (HMAC-SHA256).
pub const TAG_SIZE: usize = 32;

/// Smallest valid record: magic + nonce + empty ciphertext + tag.
pub const MIN_RECORD_SIZE: usize = MAGIC.len() + NONCE_SIZE + TAG_SIZE;

/// Maximum record length accepted from the wire (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Keystream block width: one SHA-256 digest per counter value.
const KEYSTREAM_BLOCK: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// MAC/keystream key, derived once from the shared secret at startup and
/// immutable for the process lifetime.
#[derive(Clone)]
pub struct CipherKey([u8; 32]);

impl CipherKey {
    /// Hash the configured shared secret into the working key.
    pub fn derive(secret: &str) -> Self {
        Self(Sha256::digest(secret.as_bytes()).into())
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material must not reach logs
        f.write_str("CipherKey(..)")
    }
}

/// Symmetric framing codec for one shared key.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    key: CipherKey,
    max_frame: usize,
}

impl FrameCodec {
    /// Create a codec using the given key and the default frame size limit.
    pub fn new(key: CipherKey) -> Self {
        Self {
            key,
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Encrypt and frame one plaintext record.
    ///
    /// Generates a fresh random nonce, so encoding the same plaintext twice
    /// never produces identical bytes.
    pub fn encode(&self, plain: &[u8]) -> Bytes {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut cipher = plain.to_vec();
        self.apply_keystream(&nonce, &mut cipher);

        let tag = self.tag(&nonce, &cipher);

        let record_len = MIN_RECORD_SIZE + cipher.len();
        let mut buf = BytesMut::with_capacity(4 + record_len);
        buf.put_u32(record_len as u32);
        buf.put_slice(&MAGIC);
        buf.put_slice(&nonce);
        buf.put_slice(&cipher);
        buf.put_slice(&tag);
        buf.freeze()
    }

    /// Pop the next complete frame off `buf`.
    ///
    /// Returns `Ok(None)` when no complete frame is buffered yet; nothing is
    /// consumed. Returns `Ok(Some(plaintext))` after consuming one verified
    /// frame; call repeatedly to drain several frames from one buffer fill.
    /// Returns `Err(_)` after consuming a frame that failed verification;
    /// the stream is untrusted from that point and the caller discards
    /// whatever else is buffered.
    pub fn decode_next(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        // Need at least the length prefix
        if buf.len() < 4 {
            return Ok(None);
        }

        // Peek at record length
        let record_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if record_len > self.max_frame {
            return Err(WireError::Oversized(record_len));
        }

        // Check if we have the complete frame
        if buf.len() < 4 + record_len {
            return Ok(None);
        }

        // Consume the frame whatever the verification outcome
        buf.advance(4);
        let record = buf.split_to(record_len);

        if record.len() < MIN_RECORD_SIZE {
            return Err(WireError::Truncated(record.len()));
        }

        if record[..MAGIC.len()] != MAGIC {
            return Err(WireError::BadMagic);
        }

        let nonce = &record[MAGIC.len()..MAGIC.len() + NONCE_SIZE];
        let cipher = &record[MAGIC.len() + NONCE_SIZE..record.len() - TAG_SIZE];
        let tag = &record[record.len() - TAG_SIZE..];

        // Tag verification precedes any use of the decrypted bytes
        let expected = self.tag(nonce, cipher);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(WireError::TagMismatch);
        }

        let mut plain = cipher.to_vec();
        self.apply_keystream(nonce, &mut plain);

        Ok(Some(Bytes::from(plain)))
    }

    /// XOR `data` in place with the keystream for `nonce`.
    fn apply_keystream(&self, nonce: &[u8], data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(KEYSTREAM_BLOCK).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key.as_bytes());
            hasher.update(nonce);
            hasher.update((counter as u32).to_be_bytes());
            let block = hasher.finalize();

            for (byte, pad) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= pad;
            }
        }
    }

    fn tag(&self, nonce: &[u8], cipher: &[u8]) -> [u8; TAG_SIZE] {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(nonce);
        mac.update(cipher);
        mac.finalize().into_bytes().into()
    }
}
