//! Application message variants and field encodings.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Presence reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Available
    Online,
    /// Temporarily away
    Away,
    /// Do not disturb
    Busy,
    /// Signed off
    Offline,
}

/// One typed application message.
///
/// Exactly one kind is active per decoded message; dispatch is an
/// exhaustive match, so adding a kind is a compile-checked change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Chat text between two named parties
    Text {
        /// Message body (may be empty)
        message: String,
        /// Display name of the author
        sender: String,
        /// Display name of the addressee
        receiver: String,
    },
    /// Client announces or changes its display name
    SetName {
        /// The new display name
        name: String,
    },
    /// Client changes its presence
    SetStatus {
        /// The new presence
        status: Status,
    },
    /// The peer is composing a message
    IsTyping,
    /// Offer to send a file; the peer answers with accept or reject
    InitSendingFile {
        /// Display name of the offering side
        sender: String,
        /// Advertised file name
        file_name: String,
        /// Advertised size in bytes
        file_size: u64,
    },
    /// Accept a pending file offer
    AcceptSendingFile,
    /// Decline a pending file offer
    RejectSendingFile,
    /// The file contents, sent after the offer was accepted
    SendFile {
        /// File name as originally advertised
        file_name: String,
        /// Raw file contents
        data: Bytes,
    },
    /// Server greets a newly connected client with the current roster
    ConnectionAck {
        /// The name the server assigned to this client
        my_name: String,
        /// Display names of the other connected clients
        client_names: Vec<String>,
    },
    /// Server announces another client joining
    NewClient {
        /// Display name of the new client
        client_name: String,
    },
    /// Server announces another client leaving
    ClientDisconnected {
        /// Display name of the departed client
        client_name: String,
    },
    /// Server announces another client changing its name
    ClientNameChanged {
        /// Name before the change
        prev_name: String,
        /// Name after the change
        client_name: String,
    },
}

impl Message {
    /// Serialize into a plaintext record buffer.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|_| ProtoError::Encode)?;
        Ok(buf)
    }

    /// Parse a plaintext record buffer.
    ///
    /// Adversarially crafted buffers fail with [`ProtoError::Malformed`];
    /// decoding never panics.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        ciborium::from_reader(bytes).map_err(|_| ProtoError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) {
        let encoded = message.encode().unwrap();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(message, decoded);
    }

    #[test]
    fn test_text_roundtrip() {
        roundtrip(Message::Text {
            message: "hello there".into(),
            sender: "alice".into(),
            receiver: "bob".into(),
        });
    }

    #[test]
    fn test_empty_text_roundtrip() {
        roundtrip(Message::Text {
            message: String::new(),
            sender: String::new(),
            receiver: String::new(),
        });
    }

    #[test]
    fn test_non_ascii_names_roundtrip() {
        roundtrip(Message::Text {
            message: "góðan daginn ✨".into(),
            sender: "Åsa".into(),
            receiver: "百合".into(),
        });
        roundtrip(Message::SetName {
            name: "Łukasz".into(),
        });
    }

    #[test]
    fn test_presence_roundtrip() {
        for status in [Status::Online, Status::Away, Status::Busy, Status::Offline] {
            roundtrip(Message::SetStatus { status });
        }
        roundtrip(Message::IsTyping);
    }

    #[test]
    fn test_file_transfer_roundtrip() {
        roundtrip(Message::InitSendingFile {
            sender: "alice".into(),
            file_name: "report.pdf".into(),
            file_size: 4096,
        });
        roundtrip(Message::InitSendingFile {
            sender: "alice".into(),
            file_name: "empty.bin".into(),
            file_size: 0,
        });
        roundtrip(Message::AcceptSendingFile);
        roundtrip(Message::RejectSendingFile);
        roundtrip(Message::SendFile {
            file_name: "report.pdf".into(),
            data: Bytes::from_static(&[0x00, 0xFF, 0x42, 0x07]),
        });
        roundtrip(Message::SendFile {
            file_name: "empty.bin".into(),
            data: Bytes::new(),
        });
    }

    #[test]
    fn test_roster_roundtrip() {
        roundtrip(Message::ConnectionAck {
            my_name: "Client (3)".into(),
            client_names: vec!["alice".into(), "bob".into()],
        });
        roundtrip(Message::ConnectionAck {
            my_name: "Client (1)".into(),
            client_names: Vec::new(),
        });
        roundtrip(Message::NewClient {
            client_name: "carol".into(),
        });
        roundtrip(Message::ClientDisconnected {
            client_name: "carol".into(),
        });
        roundtrip(Message::ClientNameChanged {
            prev_name: "Client (2)".into(),
            client_name: "bob".into(),
        });
    }

    #[test]
    fn test_garbage_fails_cleanly() {
        assert!(matches!(
            Message::decode(b"not cbor at all"),
            Err(ProtoError::Malformed)
        ));
        assert!(matches!(Message::decode(&[]), Err(ProtoError::Malformed)));
    }

    #[test]
    fn test_unknown_kind_fails_cleanly() {
        // a tagged variant this protocol has never heard of
        let mut buf = Vec::new();
        ciborium::into_writer(
            &ciborium::Value::Map(vec![(
                ciborium::Value::Text("SelfDestruct".into()),
                ciborium::Value::Integer(1i64.into()),
            )]),
            &mut buf,
        )
        .unwrap();

        assert!(matches!(
            Message::decode(&buf),
            Err(ProtoError::Malformed)
        ));
    }

    #[test]
    fn test_truncated_buffer_fails_cleanly() {
        let encoded = Message::Text {
            message: "truncate me".into(),
            sender: "alice".into(),
            receiver: "bob".into(),
        }
        .encode()
        .unwrap();

        for len in 0..encoded.len() {
            assert!(
                Message::decode(&encoded[..len]).is_err(),
                "prefix of {len} bytes must not decode"
            );
        }
    }
}
