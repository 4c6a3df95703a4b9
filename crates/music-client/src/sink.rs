//! Where browser-mode downloads end up.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

/// One-shot "save this file" effect.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Store `bytes` under `file_name` and return the final location.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf>;
}

/// Writes files into a directory, never overwriting: a taken name gets a
/// ` (n)` suffix before the extension.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_path(&self, file_name: &str) -> PathBuf {
        let first = self.dir.join(file_name);
        if !tokio::fs::try_exists(&first).await.unwrap_or(false) {
            return first;
        }

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };
        let mut n = 1;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            let path = self.dir.join(candidate);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return path;
            }
            n += 1;
        }
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.free_path(file_name).await;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}
