//! Bridge settings persistence.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/notebook-bridge/settings.json
//! - Linux: ~/.config/notebook-bridge/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\notebook-bridge\settings.json

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_URL: &str = "ws://localhost:8765";

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// WebSocket endpoint of the external client relay
    #[serde(default = "default_url")]
    pub url: String,

    /// Give up on a running cell after this many seconds. Unset waits forever.
    #[serde(default)]
    pub execution_timeout_secs: Option<u64>,

    /// Send a protocol error for unknown command types instead of ignoring them
    #[serde(default)]
    pub report_unknown_commands: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            execution_timeout_secs: None,
            report_unknown_commands: false,
        }
    }
}

impl BridgeSettings {
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_secs.map(Duration::from_secs)
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notebook-bridge")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if file doesn't exist
pub fn load_settings() -> BridgeSettings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> BridgeSettings {
    if path.exists() {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    } else {
        BridgeSettings::default()
    }
}

/// Save settings to disk
pub fn save_settings(settings: &BridgeSettings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &BridgeSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
