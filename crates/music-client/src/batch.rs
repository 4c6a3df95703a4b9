//! BatchDownloadCoordinator: download a whole list of songs.
//!
//! In NAS mode the list goes to the server in one request and the badge
//! poll follows the resulting tasks.  In browser mode the songs are fetched
//! one at a time, in list order, each saved through the [`FileSink`]; a
//! failing item is counted and the batch moves on.

use std::sync::Arc;
use std::time::Duration;

use music_proto::config::BatchConfig;
use music_proto::protocol::{BatchDownloadRequest, TaskAccepted};
use music_proto::songs::Song;
use tracing::{debug, info, warn};

use crate::action::{UiEvent, UiSink};
use crate::download_manager::DownloadMonitor;
use crate::error::{ClientError, ValidationError};
use crate::gateway::{ApiRequest, CallMode, RequestGateway};
use crate::sink::FileSink;
use crate::source;

/// Pacing between items of a sequential batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    None,
    FixedDelay(Duration),
}

impl ThrottlePolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        if config.item_delay_ms == 0 {
            Self::None
        } else {
            Self::FixedDelay(Duration::from_millis(config.item_delay_ms))
        }
    }

    async fn pause(&self) {
        if let Self::FixedDelay(delay) = self {
            tokio::time::sleep(*delay).await;
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::FixedDelay(Duration::from_millis(1500))
    }
}

/// Where downloads are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    /// Files are fetched by this client and written locally.
    #[default]
    Browser,
    /// The server downloads into its own music directory.
    Nas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// NAS mode: the server accepted this many tasks.
    Queued { task_count: u32 },
    /// Browser mode: every item was attempted.
    Finished(BatchSummary),
}

/// A batch as the user picked it.
pub struct BatchJob<'a> {
    pub songs: &'a [Song],
    pub playlist_name: &'a str,
    pub current_playlist_source: Option<&'a str>,
    pub selected_source: &'a str,
    pub quality: &'a str,
}

pub struct BatchDownloadCoordinator {
    gateway: RequestGateway,
    ui: UiSink,
    sink: Arc<dyn FileSink>,
    monitor: DownloadMonitor,
    throttle: ThrottlePolicy,
}

impl BatchDownloadCoordinator {
    pub fn new(
        gateway: RequestGateway,
        ui: UiSink,
        sink: Arc<dyn FileSink>,
        monitor: DownloadMonitor,
        throttle: ThrottlePolicy,
    ) -> Self {
        Self {
            gateway,
            ui,
            sink,
            monitor,
            throttle,
        }
    }

    /// Run a batch.  An empty list or an unresolvable source is rejected
    /// before any request goes out.
    pub async fn run(
        &self,
        mode: DownloadMode,
        job: BatchJob<'_>,
    ) -> Result<BatchOutcome, ClientError> {
        if job.songs.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        let batch_source =
            source::resolve(&[job.current_playlist_source, Some(job.selected_source)])
            .ok_or(ValidationError::UnresolvedSource)?;

        info!(
            "batch of {} songs from {} ({:?}, {})",
            job.songs.len(),
            batch_source,
            mode,
            job.quality
        );
        match mode {
            DownloadMode::Nas => self.submit_to_server(&job, batch_source).await,
            DownloadMode::Browser => Ok(BatchOutcome::Finished(
                self.download_sequentially(&job, batch_source).await,
            )),
        }
    }

    async fn submit_to_server(
        &self,
        job: &BatchJob<'_>,
        batch_source: &str,
    ) -> Result<BatchOutcome, ClientError> {
        let body = BatchDownloadRequest {
            playlist_name: job.playlist_name.to_string(),
            songs: job.songs.to_vec(),
        };
        let request = ApiRequest::post("nas/download/batch")
            .query("source", batch_source)
            .query("quality", job.quality)
            .json(&body);
        let accepted: TaskAccepted = self.gateway.call(request, CallMode::Foreground).await?;
        let task_count = accepted.task_count.unwrap_or(0);

        info!("server accepted {} tasks", task_count);
        self.monitor.start_badge();
        Ok(BatchOutcome::Queued { task_count })
    }

    async fn download_sequentially(&self, job: &BatchJob<'_>, batch_source: &str) -> BatchSummary {
        let _busy = self.gateway.busy().acquire();
        let total = job.songs.len();
        let mut summary = BatchSummary::default();

        for (index, song) in job.songs.iter().enumerate() {
            if index > 0 {
                self.throttle.pause().await;
            }
            let item_source =
                source::resolve(&[song.source(), Some(batch_source)]).unwrap_or(batch_source);

            match self.fetch_and_save(song, item_source, job.quality, CallMode::Silent).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!("batch item {}/{} ({}) failed: {}", index + 1, total, song.display(), e);
                    summary.failed += 1;
                }
            }
            self.ui.emit(UiEvent::BatchProgress {
                done: index + 1,
                total,
            });
        }

        info!("batch done: {} ok, {} failed", summary.succeeded, summary.failed);
        summary
    }

    /// Fetch one song as a file and hand it to the sink.
    pub async fn download_file(
        &self,
        song: &Song,
        source: &str,
        quality: &str,
    ) -> Result<(), ClientError> {
        self.fetch_and_save(song, source, quality, CallMode::Foreground).await
    }

    /// Queue one song on the server and follow it with the badge poll.
    pub async fn download_on_server(
        &self,
        song: &Song,
        source: &str,
        quality: &str,
    ) -> Result<Option<String>, ClientError> {
        let request = ApiRequest::post("nas/download")
            .query("source", source)
            .query("quality", quality)
            .json(song);
        let accepted: TaskAccepted = self.gateway.call(request, CallMode::Foreground).await?;
        debug!("nas task {:?} queued for {}", accepted.task_id, song.display());
        self.monitor.start_badge();
        Ok(accepted.task_id)
    }

    async fn fetch_and_save(
        &self,
        song: &Song,
        source: &str,
        quality: &str,
        mode: CallMode,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::post("download/file")
            .query("source", source)
            .query("quality", quality)
            .json(song);
        let bytes = self.gateway.call_blob(request, mode).await?;
        let path = self
            .sink
            .save(&song.file_name(), &bytes)
            .await
            .map_err(|e| ClientError::Save(format!("{:#}", e)))?;
        self.ui.emit(UiEvent::FileSaved {
            song: song.display(),
            path,
        });
        Ok(())
    }
}
