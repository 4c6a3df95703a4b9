//! App: the controller between user actions and the engine.
//!
//! Every foreground action validates its input, picks a source, issues its
//! requests and publishes the result as [`UiEvent`]s.  A failing action
//! becomes an error notice and leaves the previous view state untouched.

use std::sync::Arc;

use music_proto::config::Config;
use music_proto::protocol::{DownloadLink, LyricsPayload, NasStatus};
use music_proto::providers::{self, ProviderId};
use music_proto::songs::{ParsedPlaylist, Playlist, Song};
use music_proto::state::PreferenceStore;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::action::{SongView, Tab, UiEvent, UiSink};
use crate::app_state::AppState;
use crate::batch::{BatchDownloadCoordinator, BatchJob, BatchOutcome, DownloadMode, ThrottlePolicy};
use crate::busy::BusyIndicator;
use crate::download_manager::DownloadMonitor;
use crate::error::{ClientError, ValidationError};
use crate::fanout::FanoutAggregator;
use crate::gateway::{ApiRequest, CallMode, RequestGateway, Transport};
use crate::qr_login::{LoginBook, QrLogin};
use crate::sink::FileSink;
use crate::source;

const NO_LYRICS: &str = "no lyrics";

pub struct App {
    gateway: RequestGateway,
    fanout: FanoutAggregator,
    ui: UiSink,
    prefs: Arc<PreferenceStore>,
    monitor: DownloadMonitor,
    batch: BatchDownloadCoordinator,
    qr: QrLogin,
    clipboard: bool,
    pub state: AppState,
}

impl App {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        prefs: Arc<PreferenceStore>,
        sink: Arc<dyn FileSink>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let busy = BusyIndicator::new();
        let gateway = RequestGateway::new(transport, busy.clone());
        let (ui, rx) = UiSink::channel();
        let monitor = DownloadMonitor::new(gateway.clone(), ui.clone(), config);
        let batch = BatchDownloadCoordinator::new(
            gateway.clone(),
            ui.clone(),
            sink,
            monitor.clone(),
            ThrottlePolicy::from_config(&config.batch),
        );
        let qr = QrLogin::new(gateway.clone(), ui.clone(), LoginBook::default(), config);

        let app = Self {
            fanout: FanoutAggregator::with_all_providers(busy),
            gateway,
            ui,
            prefs,
            monitor,
            batch,
            qr,
            clipboard: true,
            state: AppState::default(),
        };
        (app, rx)
    }

    /// Never touch the system clipboard (headless runs, tests).
    pub fn without_clipboard(mut self) -> Self {
        self.clipboard = false;
        self
    }

    pub fn busy(&self) -> &Arc<BusyIndicator> {
        self.gateway.busy()
    }

    pub fn monitor(&self) -> &DownloadMonitor {
        &self.monitor
    }

    pub fn qr(&self) -> &QrLogin {
        &self.qr
    }

    /// Load the persisted quality, pick the download mode and fetch login
    /// state.  Nothing here fails: an unreachable server means browser mode.
    pub async fn init(&mut self) {
        self.state.quality = self.prefs.quality().await;
        self.state.mode = self.detect_mode().await;
        self.qr.refresh_all().await;
        info!(
            "client ready: mode={:?} quality={} source={}",
            self.state.mode, self.state.quality, self.state.selected_source
        );
    }

    async fn detect_mode(&self) -> DownloadMode {
        match self
            .gateway
            .call::<NasStatus>(ApiRequest::get("nas/status"), CallMode::Silent)
            .await
        {
            Ok(status) if status.enabled => {
                info!(
                    "NAS downloads enabled ({})",
                    status.music_dir.as_deref().unwrap_or("?")
                );
                DownloadMode::Nas
            }
            Ok(_) => DownloadMode::Browser,
            Err(e) => {
                debug!("nas status unavailable, using browser mode: {}", e);
                DownloadMode::Browser
            }
        }
    }

    // ── Settings ────────────────────────────────────────────────────────────

    pub fn set_source(&mut self, source: impl Into<ProviderId>) {
        let source = source.into();
        if !source.is_all() && providers::find(source.as_str()).is_none() {
            warn!("selected source {} is not in the provider table", source);
        }
        self.state.selected_source = source;
    }

    pub async fn set_quality(&mut self, quality: &str) -> anyhow::Result<()> {
        self.prefs.set_quality(quality).await?;
        self.state.quality = quality.to_string();
        self.ui.info(format!("quality set to {}", quality));
        Ok(())
    }

    /// Switch tabs.  The task list is polled only while its tab is shown;
    /// leaving it hands over to the badge poll.
    pub fn set_tab(&mut self, tab: Tab) {
        let previous = self.state.tab;
        if previous == tab {
            return;
        }
        self.state.tab = tab;

        if previous == Tab::Tasks {
            self.monitor.leave_tasks_tab();
        }
        if tab == Tab::Tasks {
            if self.state.mode == DownloadMode::Nas {
                self.monitor.enter_tasks_tab();
            } else {
                self.ui.warning("NAS downloads are not enabled on the server");
            }
        }
    }

    // ── Search ──────────────────────────────────────────────────────────────

    pub async fn search(&mut self, keyword: &str) -> Result<Vec<Song>, ClientError> {
        let result = self.list_by_keyword::<Song>("search", keyword).await;
        let songs = self.surface(result)?;
        if songs.is_empty() {
            self.ui.info("no songs found");
        }
        self.ui.emit(UiEvent::Songs {
            view: SongView::SearchResults,
            songs: songs.clone(),
        });
        Ok(songs)
    }

    pub async fn search_playlists(&mut self, keyword: &str) -> Result<Vec<Playlist>, ClientError> {
        let result = self.list_by_keyword::<Playlist>("playlist/search", keyword).await;
        let playlists = self.surface(result)?;
        if playlists.is_empty() {
            self.ui.info("no playlists found");
        }
        self.ui.emit(UiEvent::Playlists(playlists.clone()));
        Ok(playlists)
    }

    pub async fn recommended(&mut self) -> Result<Vec<Playlist>, ClientError> {
        let result = self.list_from_sources::<Playlist>("playlist/recommended", None).await;
        let playlists = self.surface(result)?;
        self.ui.emit(UiEvent::Playlists(playlists.clone()));
        Ok(playlists)
    }

    async fn list_by_keyword<T>(
        &self,
        path: &'static str,
        keyword: &str,
    ) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ValidationError::EmptyKeyword.into());
        }
        self.list_from_sources(path, Some(keyword)).await
    }

    /// One provider through the gateway, or every provider through the
    /// fan-out when `"all"` is selected.
    async fn list_from_sources<T>(
        &self,
        path: &'static str,
        keyword: Option<&str>,
    ) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let build = |source: &str| {
            let request = ApiRequest::get(path).query("source", source);
            match keyword {
                Some(keyword) => request.query("keyword", keyword),
                None => request,
            }
        };

        if self.state.selected_source.is_all() {
            let gateway = self.gateway.clone();
            let merged = self
                .fanout
                .fanout(|provider| {
                    let gateway = gateway.clone();
                    let request = build(provider.as_str());
                    async move { gateway.call_list::<T>(request, CallMode::Silent).await }
                })
                .await;
            debug!("{}: {} results across all providers", path, merged.len());
            Ok(merged)
        } else {
            let request = build(self.state.selected_source.as_str());
            self.gateway.call_list(request, CallMode::Foreground).await
        }
    }

    // ── Playlists ───────────────────────────────────────────────────────────

    /// Load a playlist's songs and remember it as the batch context.
    pub async fn open_playlist(&mut self, playlist: &Playlist) -> Result<Vec<Song>, ClientError> {
        let result = self.fetch_playlist_songs(playlist).await;
        let (source, songs) = self.surface(result)?;

        self.state.current_playlist_source = Some(source);
        self.state.current_playlist_name = Some(playlist.name.clone());
        self.state.current_songs = songs.clone();
        self.ui.emit(UiEvent::PlaylistOpened {
            playlist: playlist.clone(),
            songs: songs.clone(),
        });
        Ok(songs)
    }

    async fn fetch_playlist_songs(
        &self,
        playlist: &Playlist,
    ) -> Result<(String, Vec<Song>), ClientError> {
        let selected = self.state.selected_source.as_str();
        let source = source::resolve(&[playlist.source(), Some(selected)])
            .ok_or(ValidationError::UnresolvedSource)?
            .to_string();
        let request = ApiRequest::get("playlist/songs")
            .query("source", &source)
            .query("id", &playlist.id);
        let songs = self.gateway.call_list(request, CallMode::Foreground).await?;
        Ok((source, songs))
    }

    // ── Parse ───────────────────────────────────────────────────────────────

    pub async fn parse_song(&mut self, link: &str) -> Result<Option<Song>, ClientError> {
        let result = self.parse::<Option<Song>>("parse", link).await;
        let song = self.surface(result)?;
        if song.is_none() {
            self.ui.info("nothing found for this link");
        }
        self.ui.emit(UiEvent::ParsedSong(song.clone()));
        Ok(song)
    }

    /// Parse a playlist link; its songs become the batch context.
    pub async fn parse_playlist(&mut self, link: &str) -> Result<ParsedPlaylist, ClientError> {
        let result = self.parse::<ParsedPlaylist>("playlist/parse", link).await;
        let parsed = self.surface(result)?;

        self.state.current_playlist_source = Some(self.state.selected_source.to_string());
        self.state.current_playlist_name = parsed.playlist.as_ref().map(|p| p.name.clone());
        self.state.current_songs = parsed.songs.clone();
        self.ui.emit(UiEvent::ParsedPlaylist(parsed.clone()));
        Ok(parsed)
    }

    async fn parse<T: DeserializeOwned>(&self, path: &str, link: &str) -> Result<T, ClientError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(ValidationError::EmptyLink.into());
        }
        if self.state.selected_source.is_all() {
            return Err(ValidationError::AllSourceUnsupported.into());
        }
        let request = ApiRequest::get(path)
            .query("source", self.state.selected_source.as_str())
            .query("link", link);
        self.gateway.call(request, CallMode::Foreground).await
    }

    // ── Song actions ────────────────────────────────────────────────────────

    fn source_for(&self, song: &Song) -> Result<String, ClientError> {
        source::resolve_for_item(
            song.source(),
            self.state.current_playlist_source.as_deref(),
            self.state.selected_source.as_str(),
        )
        .map(str::to_string)
        .ok_or_else(|| ValidationError::UnresolvedSource.into())
    }

    pub async fn lyrics(&mut self, song: &Song) -> Result<String, ClientError> {
        let result = self.fetch_lyrics(song).await;
        let text = self.surface(result)?;
        self.ui.emit(UiEvent::Lyrics {
            title: song.display(),
            text: text.clone(),
        });
        Ok(text)
    }

    async fn fetch_lyrics(&self, song: &Song) -> Result<String, ClientError> {
        let source = self.source_for(song)?;
        let request = ApiRequest::post("lyrics").query("source", &source).json(song);
        let payload: LyricsPayload = self.gateway.call(request, CallMode::Foreground).await?;
        Ok(payload
            .lyrics
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| NO_LYRICS.to_string()))
    }

    /// Ask for a direct link.  The link is copied to the clipboard when one
    /// is available.
    pub async fn download_link(&mut self, song: &Song) -> Result<Option<String>, ClientError> {
        let result = self.fetch_link(song).await;
        let url = self.surface(result)?;

        let Some(url) = url else {
            self.ui.warning("no download link available");
            return Ok(None);
        };
        let copied = self.clipboard && copy_to_clipboard(&url);
        self.ui.emit(UiEvent::DownloadLink {
            song: song.display(),
            url: url.clone(),
            copied,
        });
        Ok(Some(url))
    }

    async fn fetch_link(&self, song: &Song) -> Result<Option<String>, ClientError> {
        let source = self.source_for(song)?;
        let request = ApiRequest::post("download").query("source", &source).json(song);
        let link: DownloadLink = self.gateway.call(request, CallMode::Foreground).await?;
        Ok(link.url.filter(|u| !u.is_empty()))
    }

    /// Download one song the way the current mode dictates.
    pub async fn download(&mut self, song: &Song) -> Result<(), ClientError> {
        let result = self.download_one(song).await;
        self.surface(result)
    }

    async fn download_one(&self, song: &Song) -> Result<(), ClientError> {
        let source = self.source_for(song)?;
        let quality = self.state.quality.as_str();
        match self.state.mode {
            DownloadMode::Browser => {
                self.batch.download_file(song, &source, quality).await?;
                self.ui.success(format!("downloaded {}", song.display()));
            }
            DownloadMode::Nas => {
                self.batch.download_on_server(song, &source, quality).await?;
                self.ui.success(format!("queued {} on the server", song.display()));
            }
        }
        Ok(())
    }

    /// Download `songs`, or the open playlist when `None`.
    pub async fn download_batch(
        &mut self,
        songs: Option<Vec<Song>>,
    ) -> Result<BatchOutcome, ClientError> {
        let songs = songs.unwrap_or_else(|| self.state.current_songs.clone());
        let name = self.state.batch_name();
        let job = BatchJob {
            songs: &songs,
            playlist_name: &name,
            current_playlist_source: self.state.current_playlist_source.as_deref(),
            selected_source: self.state.selected_source.as_str(),
            quality: &self.state.quality,
        };
        let result = self.batch.run(self.state.mode, job).await;
        let outcome = self.surface(result)?;

        match &outcome {
            BatchOutcome::Queued { task_count } => {
                self.ui.success(format!("{} download tasks queued", task_count))
            }
            BatchOutcome::Finished(summary) if summary.failed == 0 => self
                .ui
                .success(format!("downloaded {} songs", summary.succeeded)),
            BatchOutcome::Finished(summary) => self.ui.warning(format!(
                "downloaded {} songs, {} failed",
                summary.succeeded, summary.failed
            )),
        }
        Ok(outcome)
    }

    // ── Tasks ───────────────────────────────────────────────────────────────

    pub async fn refresh_tasks(&mut self) -> Result<(), ClientError> {
        let _busy = self.gateway.busy().acquire();
        let result = self.monitor.refresh_tasks().await;
        self.surface(result)
    }

    // ── Login ───────────────────────────────────────────────────────────────

    pub async fn open_login(&mut self, platform: &str) -> Result<(), ClientError> {
        let result = self.qr.open(platform).await;
        self.surface(result)
    }

    pub fn close_login(&mut self) {
        self.qr.close();
    }

    pub async fn logout(&mut self, platform: &str) -> Result<(), ClientError> {
        let result = self.qr.logout(platform).await;
        let done = self.surface(result);
        if done.is_ok() {
            self.ui.info(format!("logged out of {}", providers::display_name(Some(platform))));
        }
        done
    }

    /// Stop every background loop.
    pub fn shutdown(&self) {
        self.monitor.stop_all();
        self.qr.close();
    }

    /// Turn a failed action into an error notice.
    fn surface<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            if e.is_validation() {
                debug!("action rejected: {}", e);
            } else {
                warn!("action failed: {}", e);
            }
            self.ui.error(e.to_string());
        }
        result
    }
}

fn copy_to_clipboard(text: &str) -> bool {
    match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_string())) {
        Ok(()) => true,
        Err(e) => {
            debug!("clipboard unavailable: {}", e);
            false
        }
    }
}
