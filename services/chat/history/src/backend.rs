//! History sink backends: JSON-lines file and in-memory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{History, HistoryError, TextEntry};

/// JSON-lines file backend. One entry per line, append-only.
pub struct FileHistory {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileHistory {
    /// Open (or create) the history file, creating parent directories.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("History file opened at {:?}", path);
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl History for FileHistory {
    async fn append(&self, entry: TextEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        Ok(())
    }
}

/// In-memory backend, mainly for tests.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<TextEntry>>,
}

impl MemoryHistory {
    /// Create an empty in-memory history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub async fn entries(&self) -> Vec<TextEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl History for MemoryHistory {
    async fn append(&self, entry: TextEntry) -> Result<(), HistoryError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_history_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("chat_history.jsonl");

        let history = FileHistory::open(&path).await.unwrap();
        history
            .append(TextEntry::now("alice", "bob", "first"))
            .await
            .unwrap();
        history
            .append(TextEntry::now("bob", "alice", "second"))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TextEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.sender, "alice");
        assert_eq!(first.receiver, "bob");
        assert_eq!(first.message, "first");

        let second: TextEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.sender, "bob");
    }

    #[tokio::test]
    async fn test_memory_history_captures_entries() {
        let history = MemoryHistory::new();
        history
            .append(TextEntry::now("alice", "bob", "hi"))
            .await
            .unwrap();

        let entries = history.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "hi");
    }
}
