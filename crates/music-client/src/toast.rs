//! Transient notifications.
//!
//! The engine emits [`Notice`] values; the front end keeps them in a
//! [`NoticeBoard`] that drops duplicates, caps the queue and expires old
//! entries on `tick()`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn icon(self) -> &'static str {
        match self {
            Self::Info => "·",
            Self::Success => "✓",
            Self::Warning => "!",
            Self::Error => "✗",
        }
    }

    /// Errors stay up a little longer than the configured default.
    fn lifetime(self, base: Duration) -> Duration {
        match self {
            Self::Info | Self::Success => base,
            Self::Warning => base + base / 4,
            Self::Error => base * 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn line(&self) -> String {
        format!("{} {}", self.severity.icon(), self.message)
    }
}

struct Entry {
    notice: Notice,
    expires: Instant,
}

pub struct NoticeBoard {
    entries: VecDeque<Entry>,
    base: Duration,
    max_visible: usize,
}

impl NoticeBoard {
    pub fn new(base: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            base,
            max_visible: 4,
        }
    }

    pub fn push(&mut self, notice: Notice) {
        // Same message replaces the older copy
        self.entries.retain(|e| e.notice.message != notice.message);
        let expires = Instant::now() + notice.severity.lifetime(self.base);
        self.entries.push_back(Entry { notice, expires });
        while self.entries.len() > self.max_visible * 2 {
            self.entries.pop_front();
        }
    }

    /// Drop expired notices.  Call periodically.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.entries.retain(|e| e.expires > now);
    }

    /// Newest first, at most `max_visible`.
    pub fn visible(&self) -> Vec<&Notice> {
        self.entries
            .iter()
            .rev()
            .take(self.max_visible)
            .map(|e| &e.notice)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
