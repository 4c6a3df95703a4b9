//! UiEvent: everything the engine asks the front end to render.
//!
//! The engine never draws anything itself.  Each operation pushes events
//! into a [`UiSink`]; the front end drains the receiving end and renders.

use std::path::PathBuf;

use music_proto::protocol::{Batch, DownloadTask};
use music_proto::songs::{ParsedPlaylist, Playlist, Song};
use tokio::sync::mpsc;
use tracing::trace;

use crate::toast::{Notice, Severity};

/// Which tab (view) is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Search,
    Playlist,
    Parse,
    Tasks,
}

/// Where a list of songs is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongView {
    SearchResults,
    PlaylistDetail,
}

/// What the QR dialog shows.
#[derive(Debug, Clone, PartialEq)]
pub enum QrView {
    /// Waiting for the first code.
    Spinner(String),
    /// A fresh base64 PNG to display.
    Image(String),
    Status(String),
    Success(String),
    Error(String),
    /// The platform is already logged in; no session was started.
    LoggedIn { nickname: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Notice(Notice),

    // ── Results ─────────────────────────────────────────────────────────────
    Songs { view: SongView, songs: Vec<Song> },
    Playlists(Vec<Playlist>),
    PlaylistOpened { playlist: Playlist, songs: Vec<Song> },
    ParsedSong(Option<Song>),
    ParsedPlaylist(ParsedPlaylist),
    Lyrics { title: String, text: String },

    // ── Downloads ───────────────────────────────────────────────────────────
    DownloadLink { song: String, url: String, copied: bool },
    FileSaved { song: String, path: PathBuf },
    Tasks { tasks: Vec<DownloadTask>, batches: Vec<Batch> },
    /// Number of active background tasks; 0 hides the badge.
    Badge(usize),
    BatchProgress { done: usize, total: usize },

    // ── Login ───────────────────────────────────────────────────────────────
    Qr { platform: String, view: QrView },
    QrClosed { platform: String },
    LoginChanged { platform: String, logged_in: bool, nickname: String },
}

/// Sending half of the UI event stream.  Sends to a closed stream are
/// dropped: a front end that went away does not fail engine operations.
#[derive(Clone, Debug)]
pub struct UiSink(mpsc::UnboundedSender<UiEvent>);

impl UiSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn emit(&self, event: UiEvent) {
        if let Err(e) = self.0.send(event) {
            trace!("ui event dropped, no receiver: {:?}", e.0);
        }
    }

    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.emit(UiEvent::Notice(Notice::new(severity, message)));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Severity::Error, message);
    }
}
