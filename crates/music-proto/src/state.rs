//! The one piece of client state that survives a restart: the preferred
//! download quality.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_QUALITY: &str = "320k";

/// Qualities accepted by `download/file?quality=`.
pub const QUALITIES: &[&str] = &["128k", "320k", "flac"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_quality")]
    pub quality: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            quality: default_quality(),
        }
    }
}

fn default_quality() -> String {
    DEFAULT_QUALITY.to_string()
}

pub struct PreferenceStore {
    prefs: Arc<RwLock<Preferences>>,
    prefs_file: PathBuf,
}

impl PreferenceStore {
    pub fn new(prefs_file: PathBuf) -> Self {
        let prefs = Self::load_persistent(&prefs_file);
        Self {
            prefs: Arc::new(RwLock::new(prefs)),
            prefs_file,
        }
    }

    pub async fn get(&self) -> Preferences {
        self.prefs.read().await.clone()
    }

    pub async fn quality(&self) -> String {
        self.prefs.read().await.quality.clone()
    }

    pub async fn set_quality(&self, quality: impl Into<String>) -> anyhow::Result<()> {
        let quality = quality.into();
        if !QUALITIES.contains(&quality.as_str()) {
            anyhow::bail!("unsupported quality {:?} (expected one of {:?})", quality, QUALITIES);
        }
        {
            let mut prefs = self.prefs.write().await;
            prefs.quality = quality;
        }
        self.save().await
    }

    async fn save(&self) -> anyhow::Result<()> {
        let prefs = self.prefs.read().await.clone();

        if let Some(parent) = self.prefs_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&prefs)?;
        tokio::fs::write(&self.prefs_file, json).await?;
        Ok(())
    }

    fn load_persistent(prefs_file: &Path) -> Preferences {
        if let Ok(content) = std::fs::read_to_string(prefs_file) {
            match serde_json::from_str::<Preferences>(&content) {
                Ok(prefs) => return prefs,
                Err(e) => tracing::warn!("ignoring unreadable preferences file: {}", e),
            }
        }
        Preferences::default()
    }
}
