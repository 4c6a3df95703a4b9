//! Command-line front end: argument definitions and a text renderer for
//! [`UiEvent`]s.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use clap::{Args as ClapArgs, Parser, Subcommand};
use music_proto::platform;
use music_proto::protocol::TaskStatus;
use music_proto::providers;
use music_proto::songs::{Playlist, Song};
use tracing::warn;

use crate::action::{QrView, SongView, UiEvent};
use crate::toast::NoticeBoard;

#[derive(Parser, Debug)]
#[command(
    name = "musiclib",
    author,
    version,
    about = "Search and download music across providers",
    long_about = None
)]
pub struct Args {
    /// Provider to use, or "all" to query every provider
    #[arg(
        short,
        long,
        default_value = providers::SOURCE_ALL,
        global = true,
        env = "MUSICLIB_SOURCE"
    )]
    pub source: String,

    /// Server origin, overriding the config file
    #[arg(long, global = true, env = "MUSICLIB_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Picks one song out of a keyword search.
#[derive(ClapArgs, Debug, Clone)]
pub struct SongPick {
    /// Search keyword
    pub keyword: String,

    /// 1-based position in the results
    #[arg(short, long, default_value_t = 1)]
    pub index: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search songs
    Search { keyword: String },
    /// Search playlists
    Playlists { keyword: String },
    /// Show recommended playlists
    Recommend,
    /// List the songs of a playlist
    Playlist {
        id: String,
        /// Display name used for batch downloads
        #[arg(long)]
        name: Option<String>,
    },
    /// Resolve a song or playlist link (needs a concrete --source)
    Parse {
        link: String,
        /// Treat the link as a playlist
        #[arg(short, long)]
        playlist: bool,
    },
    /// Show the lyrics of a song
    Lyrics(SongPick),
    /// Download a song, or only print its direct link
    Download {
        #[command(flatten)]
        pick: SongPick,
        #[arg(long)]
        link_only: bool,
    },
    /// Download a whole playlist
    Batch {
        /// Playlist id, or a playlist link with --link
        target: String,
        #[arg(long)]
        link: bool,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show server-side download tasks
    Tasks {
        /// Keep refreshing until interrupted
        #[arg(short, long)]
        watch: bool,
    },
    /// Log in to a platform by scanning a QR code
    Login { platform: String },
    /// Log out of a platform
    Logout { platform: String },
    /// Show download mode and login state
    Status,
    /// Show or set the preferred download quality
    Quality { value: Option<String> },
}

/// Prints UI events as plain text.
pub struct Renderer<W: Write> {
    out: W,
    notices: NoticeBoard,
    last_badge: Option<usize>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, notice_lifetime: Duration) -> Self {
        Self {
            out,
            notices: NoticeBoard::new(notice_lifetime),
            last_badge: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &UiEvent) -> std::io::Result<()> {
        match event {
            UiEvent::Notice(notice) => {
                self.notices.tick();
                let shown = self
                    .notices
                    .visible()
                    .iter()
                    .any(|n| n.message == notice.message);
                self.notices.push(notice.clone());
                if !shown {
                    writeln!(self.out, "{}", notice.line())?;
                }
            }
            UiEvent::Songs { view, songs } => {
                if *view == SongView::PlaylistDetail {
                    writeln!(self.out, "{} songs", songs.len())?;
                }
                self.songs(songs)?;
            }
            UiEvent::Playlists(playlists) => self.playlists(playlists)?,
            UiEvent::PlaylistOpened { playlist, songs } => {
                writeln!(self.out, "{} ({} songs)", playlist.name, songs.len())?;
                self.songs(songs)?;
            }
            UiEvent::ParsedSong(Some(song)) => self.songs(std::slice::from_ref(song))?,
            UiEvent::ParsedSong(None) => {}
            UiEvent::ParsedPlaylist(parsed) => {
                if let Some(playlist) = &parsed.playlist {
                    writeln!(self.out, "{}  {}", playlist.name, playlist.meta_line())?;
                }
                self.songs(&parsed.songs)?;
            }
            UiEvent::Lyrics { title, text } => {
                writeln!(self.out, "── {} ──", title)?;
                writeln!(self.out, "{}", text)?;
            }
            UiEvent::DownloadLink { song, url, copied } => {
                writeln!(self.out, "{}", song)?;
                writeln!(self.out, "{}", url)?;
                if *copied {
                    writeln!(self.out, "(copied to clipboard)")?;
                }
            }
            UiEvent::FileSaved { song, path } => {
                writeln!(self.out, "saved {} -> {}", song, path.display())?;
            }
            UiEvent::Tasks { tasks, batches } => {
                for batch in batches {
                    writeln!(
                        self.out,
                        "[batch] {}  {}/{} done, {} running, {} failed",
                        batch.playlist_name,
                        batch.completed,
                        batch.total,
                        batch.running,
                        batch.failed
                    )?;
                }
                for task in tasks {
                    let progress = match (task.status, task.percent()) {
                        (TaskStatus::Running, Some(pct)) => format!(" {}%", pct),
                        _ => String::new(),
                    };
                    let detail = task
                        .error
                        .as_deref()
                        .or(task.file_path.as_deref())
                        .unwrap_or("");
                    writeln!(
                        self.out,
                        "{:<9} {}{}  {}",
                        task.status.label(),
                        task.song.display(),
                        progress,
                        detail
                    )?;
                }
            }
            UiEvent::Badge(count) => {
                if self.last_badge != Some(*count) {
                    self.last_badge = Some(*count);
                    if *count > 0 {
                        writeln!(self.out, "{} downloads active", count)?;
                    }
                }
            }
            UiEvent::BatchProgress { done, total } => {
                writeln!(self.out, "[{}/{}]", done, total)?;
            }
            UiEvent::Qr { platform, view } => self.qr(platform, view)?,
            UiEvent::QrClosed { .. } => {}
            UiEvent::LoginChanged {
                platform,
                logged_in,
                nickname,
            } => {
                let name = providers::display_name(Some(platform.as_str()));
                if *logged_in {
                    writeln!(self.out, "{}: logged in as {}", name, nickname)?;
                } else {
                    writeln!(self.out, "{}: not logged in", name)?;
                }
            }
        }
        self.out.flush()
    }

    fn songs(&mut self, songs: &[Song]) -> std::io::Result<()> {
        for (i, song) in songs.iter().enumerate() {
            writeln!(
                self.out,
                "{:>3}. {}  [{}] {} {}",
                i + 1,
                song.display(),
                providers::display_name(song.source()),
                song.format_duration(),
                song.format_size()
            )?;
        }
        Ok(())
    }

    fn playlists(&mut self, playlists: &[Playlist]) -> std::io::Result<()> {
        for (i, playlist) in playlists.iter().enumerate() {
            writeln!(
                self.out,
                "{:>3}. {}  [{}] {}  id={}",
                i + 1,
                playlist.name,
                providers::display_name(playlist.source()),
                playlist.meta_line(),
                playlist.id
            )?;
        }
        Ok(())
    }

    fn qr(&mut self, platform: &str, view: &QrView) -> std::io::Result<()> {
        match view {
            QrView::Spinner(text) | QrView::Status(text) => writeln!(self.out, "{}", text),
            QrView::Success(text) => writeln!(self.out, "✓ {}", text),
            QrView::Error(text) => writeln!(self.out, "✗ {}", text),
            QrView::LoggedIn { nickname } => {
                writeln!(self.out, "already logged in as {}", nickname)
            }
            QrView::Image(image) => match save_qr_image(platform, image) {
                Ok(path) => writeln!(self.out, "QR code saved to {}", path.display()),
                Err(e) => {
                    warn!("could not write QR image: {:#}", e);
                    writeln!(self.out, "✗ could not write the QR code image")
                }
            },
        }
    }
}

/// Decode a base64 PNG (optionally a `data:` URL) into the temp directory.
pub fn save_qr_image(platform: &str, image: &str) -> anyhow::Result<PathBuf> {
    let encoded = image
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(image)
        .trim();
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let dir = platform::temp_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("musiclib-login-{}.png", platform));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Select the `index`-th (1-based) song of a result list.
pub fn pick(songs: &[Song], index: usize) -> Option<&Song> {
    index.checked_sub(1).and_then(|i| songs.get(i))
}
