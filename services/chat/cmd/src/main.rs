//! Parley chat node binary.
//!
//! Runs either side of the protocol: a listening server that spawns one
//! session per accepted connection (all sharing one history file), or an
//! outbound client session. The UI is whatever reads the log; this binary
//! wires transport, codec, and sessions together.

use chat_history::{FileHistory, History};
use chat_proto::Status;
use chat_session::{listen_chat, Role, Session, SessionCommand, SessionConfig, SessionEvent};
use chat_wire::CipherKey;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::ChatConfig;

/// Encrypted chat node (client or server role)
#[derive(Parser, Debug)]
#[command(name = "parley-chat", version, about = "Encrypted chat node (client or server role)")]
struct Args {
    /// Listen address for the server role, e.g. 0.0.0.0:9400
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Server address for the client role, e.g. 127.0.0.1:9400
    #[arg(long)]
    connect: Option<SocketAddr>,

    /// Display name announced to the peer
    #[arg(long)]
    name: Option<String>,

    /// Directory where inbound files are saved
    #[arg(long)]
    downloads_dir: Option<PathBuf>,

    /// History file for the server role (JSON lines)
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("chat_wire={}", args.log_level).parse()?)
        .add_directive(format!("chat_proto={}", args.log_level).parse()?)
        .add_directive(format!("chat_session={}", args.log_level).parse()?)
        .add_directive(format!("chat_history={}", args.log_level).parse()?)
        .add_directive(format!("parley_chat={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("Starting parley chat node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ChatConfig::load_from_file(&args.config)?;
    if let Some(name) = args.name {
        config.display_name = name;
    }
    if let Some(downloads_dir) = args.downloads_dir {
        config.downloads_dir = downloads_dir;
    }
    if let Some(history_file) = args.history_file {
        config.history_file = history_file;
    }

    // Derived exactly once; every session shares the same immutable key
    let key = CipherKey::derive(&config.shared_key);

    match (args.listen, args.connect) {
        (Some(listen_addr), None) => run_server(listen_addr, config, key).await,
        (None, Some(server_addr)) => run_client(server_addr, config, key).await,
        _ => anyhow::bail!(
            "Specify exactly one of --listen (server role) or --connect (client role)"
        ),
    }
}

async fn run_server(
    listen_addr: SocketAddr,
    config: ChatConfig,
    key: CipherKey,
) -> anyhow::Result<()> {
    let history: Arc<dyn History> = Arc::new(FileHistory::open(&config.history_file).await?);
    info!("Logging text history to {:?}", config.history_file);

    let listener = listen_chat(listen_addr).await?;
    info!("Listening on {}", listen_addr);

    let mut next_session_id: u64 = 0;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        next_session_id += 1;
                        let session_id = next_session_id;
                        info!("Accepted connection from {} as session {}", peer_addr, session_id);

                        let mut session_config = SessionConfig::new(Role::Server, key.clone());
                        session_config.display_name = config.display_name.clone();
                        session_config.session_id = session_id;
                        session_config.downloads_dir = config.downloads_dir.clone();

                        let history = history.clone();
                        tokio::spawn(async move {
                            let (command_tx, command_rx) = mpsc::channel(16);
                            let (event_tx, event_rx) = mpsc::channel(64);

                            let session = tokio::spawn(Session::run_inbound(
                                session_config,
                                stream,
                                command_rx,
                                event_tx,
                                Some(history),
                            ));

                            drive_events(session_id, event_rx, command_tx).await;

                            match session.await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => warn!("Session {} ended with error: {:#}", session_id, e),
                                Err(e) => warn!("Session {} task failed: {}", session_id, e),
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}; stopping listener", e);
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn run_client(
    server_addr: SocketAddr,
    config: ChatConfig,
    key: CipherKey,
) -> anyhow::Result<()> {
    let mut session_config = SessionConfig::new(Role::Client, key);
    session_config.display_name = config.display_name.clone();
    session_config.downloads_dir = config.downloads_dir.clone();

    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);

    let session = tokio::spawn(Session::run_outbound(
        session_config,
        server_addr,
        command_rx,
        event_tx,
        None,
    ));

    // announce name and presence as soon as the session is up
    command_tx
        .send(SessionCommand::SendName {
            name: config.display_name.clone(),
        })
        .await
        .ok();
    command_tx
        .send(SessionCommand::SendStatus {
            status: Status::Online,
        })
        .await
        .ok();

    tokio::select! {
        _ = drive_events(0, event_rx, command_tx.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted; shutting down"),
    }

    drop(command_tx);
    match session.await {
        Ok(result) => result,
        Err(e) => anyhow::bail!("session task failed: {}", e),
    }
}

/// Log a session's events; accept inbound file offers automatically.
async fn drive_events(
    session_id: u64,
    mut events: mpsc::Receiver<SessionEvent>,
    commands: mpsc::Sender<SessionCommand>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => info!("[{}] connected", session_id),
            SessionEvent::Disconnected => {
                info!("[{}] disconnected", session_id);
                break;
            }
            SessionEvent::Text {
                message,
                sender,
                receiver,
            } => info!("[{}] {} -> {}: {}", session_id, sender, receiver, message),
            SessionEvent::NameChanged { previous, name } => {
                info!("[{}] {} is now known as {}", session_id, previous, name)
            }
            SessionEvent::StatusChanged { status } => {
                info!("[{}] peer status: {:?}", session_id, status)
            }
            SessionEvent::IsTyping => debug!("[{}] peer is typing", session_id),
            SessionEvent::FileOffer {
                sender,
                file_name,
                file_size,
            } => {
                info!(
                    "[{}] {} offers {} ({} bytes); accepting",
                    session_id, sender, file_name, file_size
                );
                commands.send(SessionCommand::AcceptFile).await.ok();
            }
            SessionEvent::FileSaved { path } => {
                info!("[{}] file saved to {:?}", session_id, path)
            }
            SessionEvent::FileOfferRejected => {
                info!("[{}] peer rejected our file offer", session_id)
            }
            SessionEvent::ConnectionAck {
                my_name,
                client_names,
            } => info!(
                "[{}] joined as {} with {} others online",
                session_id,
                my_name,
                client_names.len()
            ),
            SessionEvent::PeerJoined { client_name } => {
                info!("[{}] {} joined", session_id, client_name)
            }
            SessionEvent::PeerLeft { client_name } => {
                info!("[{}] {} left", session_id, client_name)
            }
            SessionEvent::PeerRenamed {
                prev_name,
                client_name,
            } => info!("[{}] {} is now {}", session_id, prev_name, client_name),
            SessionEvent::ProtocolViolation { detail } => {
                warn!("[{}] protocol violation: {}", session_id, detail)
            }
            SessionEvent::TransferFailed { detail } => {
                warn!("[{}] transfer failed: {}", session_id, detail)
            }
        }
    }
}
