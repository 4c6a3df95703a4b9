use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::songs::Song;

/// Every JSON endpoint under `/api/` answers with this envelope.
/// `code == 0` means success; anything else carries a `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            code: 0,
            message: None,
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: serde_json::Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Decode the payload into `T`.
    pub fn decode_data<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.data)
    }
}

// ── Download tasks ───────────────────────────────────────────────────────────

/// Server-side lifecycle of a download task.
///
/// Transitions only move forward: pending -> running -> completed | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Position in the forward-only lifecycle.  Terminal states share a rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Whether a task seen in `self` may be reported as `next`.  Terminal
    /// states are final.
    pub fn can_move_to(self, next: TaskStatus) -> bool {
        if self.is_active() {
            next.rank() >= self.rank()
        } else {
            next == self
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,
    #[serde(default)]
    pub song: Song,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Bytes written so far.
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl DownloadTask {
    /// Percent complete (0-100) when the total size is known.
    pub fn percent(&self) -> Option<u8> {
        if self.total_size == 0 {
            return None;
        }
        let pct = (self.progress.min(self.total_size) * 100) / self.total_size;
        Some(pct as u8)
    }
}

/// Aggregate over the tasks of one batch submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    #[serde(default)]
    pub playlist_name: String,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub running: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub pending: u32,
}

impl Batch {
    pub fn is_finished(&self) -> bool {
        self.completed + self.failed >= self.total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NasStatus {
    pub enabled: bool,
    #[serde(default)]
    pub music_dir: Option<String>,
    #[serde(default)]
    pub concurrency: Option<u32>,
}

/// Body of `POST nas/download/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDownloadRequest {
    pub playlist_name: String,
    pub songs: Vec<Song>,
}

/// Answer to `POST nas/download` and `POST nas/download/batch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAccepted {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub task_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadLink {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsPayload {
    #[serde(default)]
    pub lyrics: Option<String>,
}

// ── Login ────────────────────────────────────────────────────────────────────

/// Platforms that support QR login.
pub const LOGIN_PLATFORMS: &[&str] = &["netease", "qq"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginStatus {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Server-reported phase of a QR login session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QrState {
    Starting,
    WaitingScan,
    Scanned,
    Success,
    Expired,
    Error,
}

impl QrState {
    /// States after which the session's poll loop stops.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Payload of `POST login/qr/start` and `GET login/qr/poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub state: QrState,
    /// Base64-encoded PNG.
    #[serde(default)]
    pub qr_image: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QrPayload {
    pub fn new(state: QrState) -> Self {
        Self {
            state,
            qr_image: None,
            nickname: None,
            error: None,
        }
    }
}
