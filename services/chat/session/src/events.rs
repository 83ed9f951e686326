//! Events surfaced by a session to its owning application.

use chat_proto::Status;
use std::path::PathBuf;

/// Events emitted by sessions.
///
/// Events fire in the exact order frames were decoded. Roster events only
/// occur on the client role; a session never generates them about itself.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport established; the session is live
    Connected,
    /// Transport closed; all per-connection state has been discarded
    Disconnected,
    /// Text message from the peer
    Text {
        /// Message body
        message: String,
        /// Display name of the author
        sender: String,
        /// Display name of the addressee
        receiver: String,
    },
    /// The peer changed its display name (server role)
    NameChanged {
        /// Label the peer was known by before
        previous: String,
        /// The new display name
        name: String,
    },
    /// The peer changed its presence
    StatusChanged {
        /// The new presence
        status: Status,
    },
    /// The peer is composing a message
    IsTyping,
    /// The peer offers a file; answer with `AcceptFile` or `RejectFile`
    FileOffer {
        /// Display name of the offering side
        sender: String,
        /// Advertised file name
        file_name: String,
        /// Advertised size in bytes
        file_size: u64,
    },
    /// An inbound file was written to disk
    FileSaved {
        /// Where the file landed
        path: PathBuf,
    },
    /// The peer declined our file offer
    FileOfferRejected,
    /// Roster snapshot from the server (client role)
    ConnectionAck {
        /// The name the server assigned to us
        my_name: String,
        /// Display names of the other connected clients
        client_names: Vec<String>,
    },
    /// Another client joined (client role)
    PeerJoined {
        /// Display name of the new client
        client_name: String,
    },
    /// Another client left (client role)
    PeerLeft {
        /// Display name of the departed client
        client_name: String,
    },
    /// Another client changed its name (client role)
    PeerRenamed {
        /// Name before the change
        prev_name: String,
        /// Name after the change
        client_name: String,
    },
    /// A structurally valid message arrived in a state that does not
    /// expect it; the session continues
    ProtocolViolation {
        /// What was wrong
        detail: String,
    },
    /// A file read or write failed; the session stays usable
    TransferFailed {
        /// What was wrong
        detail: String,
    },
}
