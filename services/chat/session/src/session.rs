//! Core session loop and per-connection state.
//!
//! One task runs one session. The loop multiplexes inbound bytes and local
//! commands with `tokio::select!`; all state mutation happens inside this
//! task, so frame decode order is message order and no locking is needed.

use bytes::{Bytes, BytesMut};
use chat_history::{History, TextEntry};
use chat_proto::{Message, Status};
use chat_wire::{CipherKey, FrameCodec};
use chrono::Local;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::transport::connect_chat;

/// Which side of the protocol this session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates the connection; receives roster notifications
    Client,
    /// Serves an accepted connection; resolves peer names and logs history
    Server,
}

/// Configuration for a chat session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Which side of the protocol this session speaks
    pub role: Role,
    /// Our display name, used as the sender of outbound messages
    pub display_name: String,
    /// Distinguishes unnamed peers on the server ("Client (N)")
    pub session_id: u64,
    /// Where inbound files are saved
    pub downloads_dir: PathBuf,
    /// Frame encryption key, derived once at startup
    pub key: CipherKey,
}

impl SessionConfig {
    /// Config with conventional defaults for the given role.
    pub fn new(role: Role, key: CipherKey) -> Self {
        let display_name = match role {
            Role::Client => "Client".to_string(),
            Role::Server => "Server".to_string(),
        };
        Self {
            role,
            display_name,
            session_id: 0,
            downloads_dir: PathBuf::from("./downloads"),
            key,
        }
    }
}

/// Outbound operations accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a text message
    SendText {
        /// Message body
        message: String,
        /// Display name of the addressee
        receiver: String,
    },
    /// Announce a new display name
    SendName {
        /// The new name
        name: String,
    },
    /// Announce a presence change
    SendStatus {
        /// The new presence
        status: Status,
    },
    /// Tell the peer we are composing
    SendIsTyping,
    /// Offer a local file to the peer
    OfferFile {
        /// Path of the file to offer
        path: PathBuf,
    },
    /// Accept the peer's pending file offer
    AcceptFile,
    /// Decline the peer's pending file offer
    RejectFile,
}

/// Outgoing file-transfer handshake state.
#[derive(Debug)]
enum OutgoingTransfer {
    Idle,
    /// InitSendingFile sent; the peer has not answered yet
    AwaitingPeerDecision { path: PathBuf, file_name: String },
}

/// Inbound file-offer state.
#[derive(Debug)]
enum IncomingOffer {
    Idle,
    /// InitSendingFile received; waiting for the local accept/reject call
    AwaitingInboundFile,
}

/// Per-connection mutable state, owned by the session task.
struct SessionState {
    role: Role,
    local_name: String,
    peer_name: Option<String>,
    session_id: u64,
    downloads_dir: PathBuf,
    outgoing: OutgoingTransfer,
    incoming: IncomingOffer,
    history: Option<Arc<dyn History>>,
}

impl SessionState {
    fn new(config: &SessionConfig, history: Option<Arc<dyn History>>) -> Self {
        let peer_name = match config.role {
            // the client's peer is always the server
            Role::Client => Some("Server".to_string()),
            Role::Server => None,
        };
        Self {
            role: config.role,
            local_name: config.display_name.clone(),
            peer_name,
            session_id: config.session_id,
            downloads_dir: config.downloads_dir.clone(),
            outgoing: OutgoingTransfer::Idle,
            incoming: IncomingOffer::Idle,
            history,
        }
    }

    /// How this session refers to its peer, before and after SetName.
    fn peer_label(&self) -> String {
        match &self.peer_name {
            Some(name) => name.clone(),
            None => format!("Client ({})", self.session_id),
        }
    }

    /// Build the wire frame for one outbound message.
    fn frame(&self, codec: &FrameCodec, message: &Message) -> Vec<Bytes> {
        match message.encode() {
            Ok(plain) => vec![codec.encode(&plain)],
            Err(e) => {
                error!("Failed to encode outbound message: {}", e);
                Vec::new()
            }
        }
    }

    async fn log_text(&self, sender: &str, receiver: &str, message: &str) {
        let Some(history) = &self.history else {
            return;
        };
        // best-effort: history must never stall delivery
        if let Err(e) = history
            .append(TextEntry::now(sender, receiver, message))
            .await
        {
            warn!("History append failed: {}", e);
        }
    }

    async fn violation(&self, detail: &str, events: &mpsc::Sender<SessionEvent>) {
        warn!("Protocol violation: {}", detail);
        events
            .send(SessionEvent::ProtocolViolation {
                detail: detail.to_string(),
            })
            .await
            .ok();
    }

    /// Surface a roster notification, which only the client role expects.
    async fn roster_event(
        &self,
        event: SessionEvent,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Vec<Bytes> {
        if self.role == Role::Client {
            events.send(event).await.ok();
        } else {
            self.violation("roster notification received by the server role", events)
                .await;
        }
        Vec::new()
    }

    /// Write an inbound file under the downloads directory.
    async fn save_file(&self, advertised: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        // the advertised name is untrusted network input; keep only its
        // final component so it cannot escape the downloads directory
        let file_name = Path::new(advertised)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let dir = self.downloads_dir.join(self.peer_label());
        tokio::fs::create_dir_all(&dir).await?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{stamp}_{file_name}"));
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// React to one local command, returning frames to write.
    async fn handle_command(
        &mut self,
        command: SessionCommand,
        codec: &FrameCodec,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Vec<Bytes> {
        match command {
            SessionCommand::SendText { message, receiver } => {
                if self.role == Role::Server {
                    let sender = self.local_name.clone();
                    self.log_text(&sender, &receiver, &message).await;
                }
                self.frame(
                    codec,
                    &Message::Text {
                        message,
                        sender: self.local_name.clone(),
                        receiver,
                    },
                )
            }

            SessionCommand::SendName { name } => {
                self.local_name = name.clone();
                self.frame(codec, &Message::SetName { name })
            }

            SessionCommand::SendStatus { status } => {
                self.frame(codec, &Message::SetStatus { status })
            }

            SessionCommand::SendIsTyping => self.frame(codec, &Message::IsTyping),

            SessionCommand::OfferFile { path } => match tokio::fs::metadata(&path).await {
                Ok(meta) => {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "file".to_string());
                    self.outgoing = OutgoingTransfer::AwaitingPeerDecision {
                        path: path.clone(),
                        file_name: file_name.clone(),
                    };
                    debug!("Offering {:?} ({} bytes)", path, meta.len());
                    self.frame(
                        codec,
                        &Message::InitSendingFile {
                            sender: self.local_name.clone(),
                            file_name,
                            file_size: meta.len(),
                        },
                    )
                }
                Err(e) => {
                    warn!("Cannot offer {:?}: {}", path, e);
                    events
                        .send(SessionEvent::TransferFailed {
                            detail: format!("cannot offer {}: {}", path.display(), e),
                        })
                        .await
                        .ok();
                    Vec::new()
                }
            },

            SessionCommand::AcceptFile => {
                if !matches!(self.incoming, IncomingOffer::AwaitingInboundFile) {
                    debug!("Accepting with no inbound offer pending");
                }
                self.incoming = IncomingOffer::Idle;
                self.frame(codec, &Message::AcceptSendingFile)
            }

            SessionCommand::RejectFile => {
                if !matches!(self.incoming, IncomingOffer::AwaitingInboundFile) {
                    debug!("Rejecting with no inbound offer pending");
                }
                self.incoming = IncomingOffer::Idle;
                self.frame(codec, &Message::RejectSendingFile)
            }
        }
    }

    /// React to one decoded inbound message, returning frames to write.
    async fn handle_message(
        &mut self,
        message: Message,
        codec: &FrameCodec,
        events: &mpsc::Sender<SessionEvent>,
    ) -> Vec<Bytes> {
        match message {
            Message::Text {
                message,
                sender,
                receiver,
            } => {
                if self.role == Role::Server {
                    // attribute the line to the resolved display name
                    let resolved = self.peer_label();
                    self.log_text(&resolved, &receiver, &message).await;
                }
                events
                    .send(SessionEvent::Text {
                        message,
                        sender,
                        receiver,
                    })
                    .await
                    .ok();
                Vec::new()
            }

            Message::SetName { name } => {
                if self.role == Role::Server {
                    let previous = self.peer_label();
                    self.peer_name = Some(name.clone());
                    events
                        .send(SessionEvent::NameChanged { previous, name })
                        .await
                        .ok();
                } else {
                    self.violation("SetName is only valid toward the server", events)
                        .await;
                }
                Vec::new()
            }

            Message::SetStatus { status } => {
                events.send(SessionEvent::StatusChanged { status }).await.ok();
                Vec::new()
            }

            Message::IsTyping => {
                events.send(SessionEvent::IsTyping).await.ok();
                Vec::new()
            }

            Message::InitSendingFile {
                sender,
                file_name,
                file_size,
            } => {
                self.incoming = IncomingOffer::AwaitingInboundFile;
                events
                    .send(SessionEvent::FileOffer {
                        sender,
                        file_name,
                        file_size,
                    })
                    .await
                    .ok();
                Vec::new()
            }

            Message::AcceptSendingFile => {
                match std::mem::replace(&mut self.outgoing, OutgoingTransfer::Idle) {
                    OutgoingTransfer::AwaitingPeerDecision { path, file_name } => {
                        match tokio::fs::read(&path).await {
                            Ok(data) => {
                                info!("Peer accepted {:?}; sending {} bytes", file_name, data.len());
                                self.frame(
                                    codec,
                                    &Message::SendFile {
                                        file_name,
                                        data: Bytes::from(data),
                                    },
                                )
                            }
                            Err(e) => {
                                warn!("Failed to read {:?} for sending: {}", path, e);
                                events
                                    .send(SessionEvent::TransferFailed {
                                        detail: format!("cannot read {}: {}", path.display(), e),
                                    })
                                    .await
                                    .ok();
                                Vec::new()
                            }
                        }
                    }
                    OutgoingTransfer::Idle => {
                        self.violation("AcceptSendingFile with no pending outgoing file", events)
                            .await;
                        Vec::new()
                    }
                }
            }

            Message::RejectSendingFile => {
                self.outgoing = OutgoingTransfer::Idle;
                events.send(SessionEvent::FileOfferRejected).await.ok();
                Vec::new()
            }

            Message::SendFile { file_name, data } => {
                self.incoming = IncomingOffer::Idle;
                match self.save_file(&file_name, &data).await {
                    Ok(path) => {
                        info!("Saved inbound file to {:?}", path);
                        events.send(SessionEvent::FileSaved { path }).await.ok();
                    }
                    Err(e) => {
                        warn!("Failed to save inbound file {:?}: {}", file_name, e);
                        events
                            .send(SessionEvent::TransferFailed {
                                detail: format!("cannot save {}: {}", file_name, e),
                            })
                            .await
                            .ok();
                    }
                }
                Vec::new()
            }

            Message::ConnectionAck {
                my_name,
                client_names,
            } => {
                self.roster_event(
                    SessionEvent::ConnectionAck {
                        my_name,
                        client_names,
                    },
                    events,
                )
                .await
            }

            Message::NewClient { client_name } => {
                self.roster_event(SessionEvent::PeerJoined { client_name }, events)
                    .await
            }

            Message::ClientDisconnected { client_name } => {
                self.roster_event(SessionEvent::PeerLeft { client_name }, events)
                    .await
            }

            Message::ClientNameChanged {
                prev_name,
                client_name,
            } => {
                self.roster_event(
                    SessionEvent::PeerRenamed {
                        prev_name,
                        client_name,
                    },
                    events,
                )
                .await
            }
        }
    }
}

/// Main session implementation
pub struct Session;

impl Session {
    /// Run a session over an accepted (or otherwise established) stream.
    ///
    /// Returns when the peer disconnects, a write fails, or the command
    /// channel closes. All per-connection state dies with this call.
    pub async fn run_inbound<S>(
        config: SessionConfig,
        stream: S,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        event_tx: mpsc::Sender<SessionEvent>,
        history: Option<Arc<dyn History>>,
    ) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = FrameCodec::new(config.key.clone());
        let mut state = SessionState::new(&config, history);
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut read_buffer = BytesMut::with_capacity(64 * 1024);

        event_tx.send(SessionEvent::Connected).await.ok();

        'session: loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed; ending session");
                        break 'session;
                    };

                    for frame in state.handle_command(command, &codec, &event_tx).await {
                        if let Err(e) = writer.write_all(&frame).await {
                            warn!("Write failed: {}", e);
                            break 'session;
                        }
                    }
                }

                read = reader.read_buf(&mut read_buffer) => {
                    match read {
                        Ok(0) => {
                            debug!("Peer closed the connection");
                            break 'session;
                        }
                        Ok(_) => {
                            // Drain every complete frame buffered so far
                            loop {
                                match codec.decode_next(&mut read_buffer) {
                                    Ok(Some(plain)) => match Message::decode(&plain) {
                                        Ok(message) => {
                                            let frames = state
                                                .handle_message(message, &codec, &event_tx)
                                                .await;
                                            for frame in frames {
                                                if let Err(e) = writer.write_all(&frame).await {
                                                    warn!("Write failed: {}", e);
                                                    break 'session;
                                                }
                                            }
                                        }
                                        Err(e) => {
                                            // frame boundaries past this point
                                            // cannot be trusted
                                            warn!(
                                                "Malformed message ({}); discarding {} buffered bytes",
                                                e,
                                                read_buffer.len()
                                            );
                                            read_buffer.clear();
                                            break;
                                        }
                                    },
                                    Ok(None) => break,
                                    Err(e) => {
                                        warn!(
                                            "Invalid frame ({}); discarding {} buffered bytes",
                                            e,
                                            read_buffer.len()
                                        );
                                        read_buffer.clear();
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Read failed: {}", e);
                            break 'session;
                        }
                    }
                }
            }
        }

        event_tx.send(SessionEvent::Disconnected).await.ok();
        Ok(())
    }

    /// Dial a server and run a client session over the connection.
    pub async fn run_outbound(
        config: SessionConfig,
        addr: SocketAddr,
        command_rx: mpsc::Receiver<SessionCommand>,
        event_tx: mpsc::Sender<SessionEvent>,
        history: Option<Arc<dyn History>>,
    ) -> anyhow::Result<()> {
        info!("Connecting to {}", addr);
        let stream = connect_chat(addr).await?;
        info!("Connection established to {}", addr);

        Self::run_inbound(config, stream, command_rx, event_tx, history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_history::MemoryHistory;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    const TEST_SECRET: &str = "test shared secret";

    struct Harness {
        commands: mpsc::Sender<SessionCommand>,
        events: mpsc::Receiver<SessionEvent>,
    }

    impl Harness {
        async fn send(&self, command: SessionCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn next_event(&mut self) -> SessionEvent {
            timeout(Duration::from_secs(2), self.events.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed")
        }

        async fn expect_connected(&mut self) {
            match self.next_event().await {
                SessionEvent::Connected => {}
                other => panic!("expected Connected, got {:?}", other),
            }
        }
    }

    fn spawn_session<S>(
        config: SessionConfig,
        stream: S,
        history: Option<Arc<dyn History>>,
    ) -> Harness
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(Session::run_inbound(
            config, stream, command_rx, event_tx, history,
        ));
        Harness {
            commands: command_tx,
            events: event_rx,
        }
    }

    /// A connected server/client session pair over an in-memory stream.
    async fn start_pair(
        server_config: SessionConfig,
        client_config: SessionConfig,
        history: Option<Arc<dyn History>>,
    ) -> (Harness, Harness) {
        let (server_stream, client_stream) = tokio::io::duplex(1024 * 1024);

        let mut server = spawn_session(server_config, server_stream, history);
        let mut client = spawn_session(client_config, client_stream, None);

        server.expect_connected().await;
        client.expect_connected().await;
        (server, client)
    }

    fn server_config(downloads: &Path) -> SessionConfig {
        let mut config = SessionConfig::new(Role::Server, CipherKey::derive(TEST_SECRET));
        config.session_id = 7;
        config.downloads_dir = downloads.to_path_buf();
        config
    }

    fn client_config(downloads: &Path) -> SessionConfig {
        let mut config = SessionConfig::new(Role::Client, CipherKey::derive(TEST_SECRET));
        config.downloads_dir = downloads.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_text_reaches_peer_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(MemoryHistory::new());
        let (mut server, client) = start_pair(
            server_config(dir.path()),
            client_config(dir.path()),
            Some(history.clone()),
        )
        .await;

        client
            .send(SessionCommand::SendText {
                message: "hello server".into(),
                receiver: "Server".into(),
            })
            .await;

        match server.next_event().await {
            SessionEvent::Text {
                message,
                sender,
                receiver,
            } => {
                assert_eq!(message, "hello server");
                assert_eq!(sender, "Client");
                assert_eq!(receiver, "Server");
            }
            other => panic!("expected Text, got {:?}", other),
        }

        // the server attributes the line to its label for the still-unnamed peer
        let entries = history.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sender, "Client (7)");
        assert_eq!(entries[0].message, "hello server");
    }

    #[tokio::test]
    async fn test_set_name_updates_attribution() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(MemoryHistory::new());
        let (mut server, client) = start_pair(
            server_config(dir.path()),
            client_config(dir.path()),
            Some(history.clone()),
        )
        .await;

        client
            .send(SessionCommand::SendName {
                name: "alice".into(),
            })
            .await;

        match server.next_event().await {
            SessionEvent::NameChanged { previous, name } => {
                assert_eq!(previous, "Client (7)");
                assert_eq!(name, "alice");
            }
            other => panic!("expected NameChanged, got {:?}", other),
        }

        client
            .send(SessionCommand::SendText {
                message: "now with a name".into(),
                receiver: "Server".into(),
            })
            .await;
        server.next_event().await;

        let entries = history.entries().await;
        assert_eq!(entries[0].sender, "alice");
    }

    #[tokio::test]
    async fn test_status_and_typing_events() {
        let dir = tempfile::tempdir().unwrap();
        let (mut server, client) =
            start_pair(server_config(dir.path()), client_config(dir.path()), None).await;

        client
            .send(SessionCommand::SendStatus {
                status: Status::Away,
            })
            .await;
        match server.next_event().await {
            SessionEvent::StatusChanged { status } => assert_eq!(status, Status::Away),
            other => panic!("expected StatusChanged, got {:?}", other),
        }

        client.send(SessionCommand::SendIsTyping).await;
        assert!(matches!(server.next_event().await, SessionEvent::IsTyping));
    }

    #[tokio::test]
    async fn test_file_transfer_accepted() {
        let downloads = tempfile::tempdir().unwrap();
        let outbox = tempfile::tempdir().unwrap();
        let source = outbox.path().join("report.pdf");
        std::fs::write(&source, b"not really a pdf").unwrap();

        let (mut server, mut client) = start_pair(
            server_config(downloads.path()),
            client_config(downloads.path()),
            None,
        )
        .await;

        client
            .send(SessionCommand::SendName {
                name: "alice".into(),
            })
            .await;
        server.next_event().await;

        client
            .send(SessionCommand::OfferFile {
                path: source.clone(),
            })
            .await;

        match server.next_event().await {
            SessionEvent::FileOffer {
                sender,
                file_name,
                file_size,
            } => {
                assert_eq!(sender, "alice");
                assert_eq!(file_name, "report.pdf");
                assert_eq!(file_size, 16);
            }
            other => panic!("expected FileOffer, got {:?}", other),
        }

        // acceptance triggers the file send with no further client action
        server.send(SessionCommand::AcceptFile).await;

        match server.next_event().await {
            SessionEvent::FileSaved { path } => {
                let rendered = path.to_string_lossy();
                assert!(rendered.contains("alice"), "path {rendered} lacks peer name");
                assert!(
                    rendered.ends_with("_report.pdf"),
                    "path {rendered} lacks original file name"
                );
                assert_eq!(std::fs::read(&path).unwrap(), b"not really a pdf");
            }
            other => panic!("expected FileSaved, got {:?}", other),
        }

        // the pending offer was consumed; a second accept is a violation
        server.send(SessionCommand::AcceptFile).await;
        assert!(matches!(
            client.next_event().await,
            SessionEvent::ProtocolViolation { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_transfer_rejected() {
        let downloads = tempfile::tempdir().unwrap();
        let outbox = tempfile::tempdir().unwrap();
        let source = outbox.path().join("secrets.txt");
        std::fs::write(&source, b"do not send").unwrap();

        let (mut server, mut client) = start_pair(
            server_config(downloads.path()),
            client_config(downloads.path()),
            None,
        )
        .await;

        client
            .send(SessionCommand::OfferFile {
                path: source.clone(),
            })
            .await;
        assert!(matches!(
            server.next_event().await,
            SessionEvent::FileOffer { .. }
        ));

        server.send(SessionCommand::RejectFile).await;
        assert!(matches!(
            client.next_event().await,
            SessionEvent::FileOfferRejected
        ));

        // nothing was written
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);

        // the pending file name was not retained past the rejection
        server.send(SessionCommand::AcceptFile).await;
        assert!(matches!(
            client.next_event().await,
            SessionEvent::ProtocolViolation { .. }
        ));
    }

    #[tokio::test]
    async fn test_hostile_file_name_stays_in_downloads_dir() {
        let downloads = tempfile::tempdir().unwrap();
        let (server_stream, client_stream) = tokio::io::duplex(64 * 1024);
        let mut server = spawn_session(server_config(downloads.path()), server_stream, None);
        let mut raw = client_stream;
        server.expect_connected().await;

        let codec = FrameCodec::new(CipherKey::derive(TEST_SECRET));
        let plain = Message::SendFile {
            file_name: "../../escape.txt".into(),
            data: Bytes::from_static(b"gotcha"),
        }
        .encode()
        .unwrap();
        raw.write_all(&codec.encode(&plain)).await.unwrap();

        match server.next_event().await {
            SessionEvent::FileSaved { path } => {
                assert!(path.starts_with(downloads.path()));
                assert!(path.to_string_lossy().ends_with("_escape.txt"));
            }
            other => panic!("expected FileSaved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_frame_clears_buffer_then_recovers() {
        let downloads = tempfile::tempdir().unwrap();
        let (server_stream, client_stream) = tokio::io::duplex(64 * 1024);
        let mut client = spawn_session(client_config(downloads.path()), client_stream, None);
        let mut raw = server_stream;
        client.expect_connected().await;

        let codec = FrameCodec::new(CipherKey::derive(TEST_SECRET));
        let text_frame = |body: &str| {
            let plain = Message::Text {
                message: body.into(),
                sender: "Server".into(),
                receiver: "Client".into(),
            }
            .encode()
            .unwrap();
            codec.encode(&plain)
        };

        // a tampered frame followed by half of a valid one, delivered together
        let mut corrupted = text_frame("never seen").to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0x01;
        let stale = text_frame("stale half");
        corrupted.extend_from_slice(&stale[..stale.len() / 2]);
        raw.write_all(&corrupted).await.unwrap();

        // let the session consume and discard the poisoned buffer
        sleep(Duration::from_millis(100)).await;

        // a fresh valid frame decodes cleanly against the emptied buffer
        raw.write_all(&text_frame("back to normal")).await.unwrap();

        match client.next_event().await {
            SessionEvent::Text { message, .. } => assert_eq!(message, "back to normal"),
            other => panic!("expected Text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_roster_events_surface_on_client() {
        let downloads = tempfile::tempdir().unwrap();
        let (server_stream, client_stream) = tokio::io::duplex(64 * 1024);
        let mut client = spawn_session(client_config(downloads.path()), client_stream, None);
        let mut raw = server_stream;
        client.expect_connected().await;

        let codec = FrameCodec::new(CipherKey::derive(TEST_SECRET));
        let send = |message: Message| {
            let plain = message.encode().unwrap();
            codec.encode(&plain)
        };

        raw.write_all(&send(Message::ConnectionAck {
            my_name: "Client (3)".into(),
            client_names: vec!["alice".into(), "bob".into()],
        }))
        .await
        .unwrap();
        raw.write_all(&send(Message::NewClient {
            client_name: "carol".into(),
        }))
        .await
        .unwrap();
        raw.write_all(&send(Message::ClientNameChanged {
            prev_name: "carol".into(),
            client_name: "caroline".into(),
        }))
        .await
        .unwrap();
        raw.write_all(&send(Message::ClientDisconnected {
            client_name: "bob".into(),
        }))
        .await
        .unwrap();

        match client.next_event().await {
            SessionEvent::ConnectionAck {
                my_name,
                client_names,
            } => {
                assert_eq!(my_name, "Client (3)");
                assert_eq!(client_names, vec!["alice".to_string(), "bob".to_string()]);
            }
            other => panic!("expected ConnectionAck, got {:?}", other),
        }
        assert!(matches!(
            client.next_event().await,
            SessionEvent::PeerJoined { .. }
        ));
        assert!(matches!(
            client.next_event().await,
            SessionEvent::PeerRenamed { .. }
        ));
        assert!(matches!(
            client.next_event().await,
            SessionEvent::PeerLeft { .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_fires_event() {
        let downloads = tempfile::tempdir().unwrap();
        let (server_stream, client_stream) = tokio::io::duplex(64 * 1024);
        let mut client = spawn_session(client_config(downloads.path()), client_stream, None);
        client.expect_connected().await;

        drop(server_stream);

        assert!(matches!(
            client.next_event().await,
            SessionEvent::Disconnected
        ));
    }
}
