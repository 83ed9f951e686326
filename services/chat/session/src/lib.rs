//! Per-connection sessions for parley chat.
//!
//! A session owns one logical connection for its whole lifetime: it pulls
//! bytes from the transport, drains complete frames through `chat-wire`,
//! decodes them with `chat-proto`, and reacts to each message according to
//! its role (client or server) and its file-transfer state. Reactions are
//! outbound frames written back to the transport plus typed events handed
//! to the owning application over a channel, in the exact order frames were
//! decoded.
//!
//! ## Features
//!
//! - **Role Dispatch**: client and server handle the same wire protocol
//!   with role-specific reactions (history logging, roster events)
//! - **File-Transfer Handshake**: offer/accept/reject state machines per
//!   direction, with automatic file send on acceptance
//! - **Damage Containment**: an invalid frame or malformed message discards
//!   the buffered stream but never kills the process
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_session::{Role, Session, SessionCommand, SessionConfig, SessionEvent};
//! use chat_wire::CipherKey;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SessionConfig::new(Role::Client, CipherKey::derive("secret"));
//! let (command_tx, command_rx) = mpsc::channel(16);
//! let (event_tx, mut event_rx) = mpsc::channel(64);
//! let addr = "127.0.0.1:9400".parse().unwrap();
//!
//! tokio::spawn(async move {
//!     Session::run_outbound(config, addr, command_rx, event_tx, None).await
//! });
//!
//! command_tx
//!     .send(SessionCommand::SendName { name: "alice".into() })
//!     .await?;
//!
//! while let Some(event) = event_rx.recv().await {
//!     match event {
//!         SessionEvent::Text { message, sender, .. } => {
//!             println!("{sender}: {message}");
//!         }
//!         SessionEvent::Disconnected => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod session;
pub mod transport;

// Re-export main types
pub use events::SessionEvent;
pub use session::{Role, Session, SessionCommand, SessionConfig};
pub use transport::{connect_chat, listen_chat};
