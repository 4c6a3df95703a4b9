//! Songs and playlists as returned by provider endpoints.

use serde::{Deserialize, Serialize};

/// Characters that are illegal in file names on at least one platform.
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const DEFAULT_EXT: &str = "mp3";

/// A track from any provider.  `source` may be missing (or empty) in some
/// responses, in which case the caller resolves it from context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_id: String,
    /// Seconds.
    #[serde(default)]
    pub duration: u32,
    /// Bytes.
    #[serde(default)]
    pub size: u64,
    /// kbps.
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub cover: String,
}

impl Song {
    /// The song's own source, treating an empty string as absent.
    pub fn source(&self) -> Option<&str> {
        non_empty(self.source.as_deref())
    }

    /// "MM:SS", or "-" when unknown.
    pub fn format_duration(&self) -> String {
        format_duration(self.duration)
    }

    /// "X.XX MB", or "-" when unknown.
    pub fn format_size(&self) -> String {
        format_size(self.size)
    }

    /// "Artist - Name.ext" with characters illegal in file names replaced.
    pub fn file_name(&self) -> String {
        let ext = if self.ext.is_empty() { DEFAULT_EXT } else { &self.ext };
        sanitize_file_name(&format!("{} - {}.{}", self.artist, self.name, ext))
    }

    /// Short form for log lines.
    pub fn display(&self) -> String {
        format!("{} - {}", self.name, self.artist)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub track_count: Option<u32>,
    #[serde(default)]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Playlist {
    pub fn source(&self) -> Option<&str> {
        non_empty(self.source.as_deref())
    }

    /// "creator · N tracks", skipping missing parts.
    pub fn meta_line(&self) -> String {
        let mut parts = Vec::new();
        if !self.creator.is_empty() {
            parts.push(self.creator.clone());
        }
        if let Some(count) = self.track_count {
            parts.push(format!("{} tracks", count));
        }
        parts.join(" \u{b7} ")
    }
}

/// Result of parsing a playlist share link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPlaylist {
    #[serde(default)]
    pub playlist: Option<Playlist>,
    #[serde(default)]
    pub songs: Vec<Song>,
}

pub fn format_duration(seconds: u32) -> String {
    if seconds == 0 {
        return "-".to_string();
    }
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "-".to_string();
    }
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
