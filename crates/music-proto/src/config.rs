use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origin of the music API; endpoints live under `<base_url>/api/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Tick intervals of the three background poll loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_task_interval_ms")]
    pub task_interval_ms: u64,
    #[serde(default = "default_badge_interval_ms")]
    pub badge_interval_ms: u64,
    #[serde(default = "default_qr_interval_ms")]
    pub qr_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pause between items of a sequential (browser-mode) batch download.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_toast_ms")]
    pub toast_ms: u64,
    /// Delay before the QR dialog closes itself after a successful login.
    #[serde(default = "default_qr_close_delay_ms")]
    pub qr_close_delay_ms: u64,
}

/// User-configurable paths for downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for browser-mode downloads.
    /// Defaults to `~/Music/musiclib`.
    #[serde(default = "platform::default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            task_interval_ms: default_task_interval_ms(),
            badge_interval_ms: default_badge_interval_ms(),
            qr_interval_ms: default_qr_interval_ms(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: default_item_delay_ms(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            toast_ms: default_toast_ms(),
            qr_close_delay_ms: default_qr_close_delay_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: platform::default_downloads_dir(),
        }
    }
}

impl PollingConfig {
    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }

    pub fn badge_interval(&self) -> Duration {
        Duration::from_millis(self.badge_interval_ms)
    }

    pub fn qr_interval(&self) -> Duration {
        Duration::from_millis(self.qr_interval_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_task_interval_ms() -> u64 {
    2000
}

fn default_badge_interval_ms() -> u64 {
    5000
}

fn default_qr_interval_ms() -> u64 {
    2000
}

fn default_item_delay_ms() -> u64 {
    1500
}

fn default_toast_ms() -> u64 {
    2500
}

fn default_qr_close_delay_ms() -> u64 {
    1500
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
