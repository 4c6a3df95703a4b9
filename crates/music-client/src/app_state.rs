//! AppState: the in-memory view state the controller reads and writes.
//!
//! Nothing here survives a restart except `quality`, which is mirrored from
//! the preference store.

use music_proto::providers::{ProviderId, SOURCE_ALL};
use music_proto::songs::Song;
use music_proto::state::DEFAULT_QUALITY;

use crate::action::Tab;
use crate::batch::DownloadMode;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Provider picked in the source selector; `"all"` means fan-out.
    pub selected_source: ProviderId,
    /// Source of the playlist whose songs are shown, once one was opened.
    pub current_playlist_source: Option<String>,
    pub current_playlist_name: Option<String>,
    /// Songs of the open playlist; the default batch.
    pub current_songs: Vec<Song>,
    pub tab: Tab,
    pub mode: DownloadMode,
    pub quality: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            selected_source: ProviderId::from(SOURCE_ALL),
            current_playlist_source: None,
            current_playlist_name: None,
            current_songs: Vec::new(),
            tab: Tab::default(),
            mode: DownloadMode::default(),
            quality: DEFAULT_QUALITY.to_string(),
        }
    }
}

impl AppState {
    pub fn with_source(source: impl Into<ProviderId>) -> Self {
        Self {
            selected_source: source.into(),
            ..Self::default()
        }
    }

    /// Name used for a batch built from the open playlist.
    pub fn batch_name(&self) -> String {
        self.current_playlist_name
            .clone()
            .unwrap_or_else(|| "songs".to_string())
    }

    pub fn forget_playlist(&mut self) {
        self.current_playlist_source = None;
        self.current_playlist_name = None;
        self.current_songs.clear();
    }
}
