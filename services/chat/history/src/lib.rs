//! Append-only text-message history for the parley server role.
//!
//! The server attributes and records every text message that passes through
//! a session. Appends are best-effort: a failed write is reported to the
//! caller, which logs it and moves on, so history can never stall message
//! delivery.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backend::{FileHistory, MemoryHistory};

/// History sink errors
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Filesystem error while appending
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("history encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One logged text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEntry {
    /// UTC time the message was recorded
    pub timestamp: DateTime<Utc>,
    /// Display name of the author
    pub sender: String,
    /// Display name of the addressee
    pub receiver: String,
    /// Message body
    pub message: String,
}

impl TextEntry {
    /// Build an entry stamped with the current time.
    pub fn now(sender: &str, receiver: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            message: message.to_string(),
        }
    }
}

/// Sink for text-message history.
#[async_trait]
pub trait History: Send + Sync {
    /// Append one entry. Best-effort: callers log and drop failures.
    async fn append(&self, entry: TextEntry) -> Result<(), HistoryError>;
}
