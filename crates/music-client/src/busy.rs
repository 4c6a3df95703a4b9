//! Process-wide "busy" indicator shared by every foreground request.
//!
//! Callers never toggle the flag directly: they hold a [`BusyGuard`] for the
//! duration of the work.  Guards nest, and the indicator is shown when the
//! first guard is taken and hidden when the last one is dropped, on success
//! and failure paths alike.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

pub struct BusyIndicator {
    depth: Mutex<usize>,
    visible: watch::Sender<bool>,
    shows: AtomicUsize,
    hides: AtomicUsize,
}

impl BusyIndicator {
    pub fn new() -> Arc<Self> {
        let (visible, _) = watch::channel(false);
        Arc::new(Self {
            depth: Mutex::new(0),
            visible,
            shows: AtomicUsize::new(0),
            hides: AtomicUsize::new(0),
        })
    }

    /// Show the indicator (if not already shown) until the guard drops.
    pub fn acquire(self: &Arc<Self>) -> BusyGuard {
        let mut depth = self.depth.lock().unwrap_or_else(|e| e.into_inner());
        *depth += 1;
        if *depth == 1 {
            self.shows.fetch_add(1, Ordering::SeqCst);
            self.visible.send_replace(true);
            debug!("busy indicator shown");
        }
        BusyGuard {
            indicator: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut depth = self.depth.lock().unwrap_or_else(|e| e.into_inner());
        *depth = depth.saturating_sub(1);
        if *depth == 0 {
            self.hides.fetch_add(1, Ordering::SeqCst);
            self.visible.send_replace(false);
            debug!("busy indicator hidden");
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.visible.borrow()
    }

    /// Follow visibility changes (e.g. to drive a spinner).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    /// How many times the indicator went from hidden to shown.
    pub fn show_count(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }

    /// How many times the indicator went from shown to hidden.
    pub fn hide_count(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }
}

/// Keeps the indicator shown while alive.
#[must_use = "the indicator is hidden as soon as the guard is dropped"]
pub struct BusyGuard {
    indicator: Arc<BusyIndicator>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.indicator.release();
    }
}
