//! Per-user locations of the client's files.

use std::path::PathBuf;

const APP_DIR: &str = "musiclib";

/// Log file and preferences: `~/.local/share/musiclib` on Unix.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    let base = dirs::home_dir().map(|h| h.join(".local").join("share"));
    #[cfg(not(unix))]
    let base = dirs::data_local_dir();

    base.unwrap_or_else(temp_dir).join(APP_DIR)
}

/// `config.toml`: `~/.config/musiclib` on Unix, macOS included.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    let base = dirs::home_dir().map(|h| h.join(".config"));
    #[cfg(not(unix))]
    let base = dirs::config_dir();

    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Default target for browser-mode downloads: `~/Music/musiclib`.
pub fn default_downloads_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(temp_dir)
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_location_is_app_scoped() {
        for dir in [data_dir(), config_dir(), default_downloads_dir()] {
            assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some(APP_DIR));
        }
    }
}
