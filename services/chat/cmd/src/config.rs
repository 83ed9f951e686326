//! Configuration handling for the chat node.
//!
//! Settings come from a YAML file overridden by environment variables; the
//! command line (see `main.rs`) wins over both.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fallback shared secret used when neither the config file nor the
/// environment provides one. Insecure on purpose: anyone with this source
/// can read such traffic, so any real deployment must set `CHAT_SHARED_KEY`.
pub const DEFAULT_SHARED_KEY: &str = "CHANGE_ME_SHARED_KEY";

/// Chat node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Pre-shared secret the frame key is derived from
    pub shared_key: String,
    /// Display name announced to peers
    pub display_name: String,
    /// Directory inbound files are saved under
    pub downloads_dir: PathBuf,
    /// JSON-lines history file (server role)
    pub history_file: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            shared_key: DEFAULT_SHARED_KEY.to_string(),
            display_name: "Server".to_string(),
            downloads_dir: PathBuf::from("./downloads"),
            history_file: PathBuf::from("./history/chat_history.jsonl"),
        }
    }
}

/// On-disk configuration structure (matches the YAML file)
#[derive(Debug, Deserialize)]
struct FileConfig {
    shared_key: Option<String>,
    display_name: Option<String>,
    downloads_dir: Option<PathBuf>,
    history_file: Option<PathBuf>,
}

impl ChatConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Ok(file_config) = serde_yaml::from_str::<FileConfig>(&content) {
                config.apply_file_config(file_config);
                info!("Loaded configuration from {:?}", config_path.as_ref());
            } else {
                warn!(
                    "Failed to parse config file {:?}, using defaults",
                    config_path.as_ref()
                );
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();

        if config.shared_key == DEFAULT_SHARED_KEY {
            warn!("Using the built-in shared key; set CHAT_SHARED_KEY for any real deployment");
        }

        Ok(config)
    }

    fn apply_file_config(&mut self, file: FileConfig) {
        if let Some(shared_key) = file.shared_key {
            self.shared_key = shared_key;
        }
        if let Some(display_name) = file.display_name {
            self.display_name = display_name;
        }
        if let Some(downloads_dir) = file.downloads_dir {
            self.downloads_dir = downloads_dir;
        }
        if let Some(history_file) = file.history_file {
            self.history_file = history_file;
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(shared_key) = std::env::var("CHAT_SHARED_KEY") {
            if !shared_key.is_empty() {
                self.shared_key = shared_key;
                info!("Shared key overridden by environment");
            }
        }

        if let Ok(display_name) = std::env::var("CHAT_DISPLAY_NAME") {
            if !display_name.is_empty() {
                self.display_name = display_name;
                info!("Display name overridden by environment");
            }
        }

        if let Ok(downloads_dir) = std::env::var("CHAT_DOWNLOADS_DIR") {
            if !downloads_dir.is_empty() {
                self.downloads_dir = PathBuf::from(downloads_dir);
                info!("Downloads directory overridden by environment");
            }
        }

        if let Ok(history_file) = std::env::var("CHAT_HISTORY_FILE") {
            if !history_file.is_empty() {
                self.history_file = PathBuf::from(history_file);
                info!("History file overridden by environment");
            }
        }
    }
}
