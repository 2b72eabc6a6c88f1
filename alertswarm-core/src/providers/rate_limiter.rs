//! Sliding-window request budget shared by every caller of one enrichment provider.
//!
//! Each provider client owns one `RateWindow` for the lifetime of the process.
//! Concurrent investigations draw from the same window, so the
//! prune/check/append sequence runs under a single lock in [`RateWindow::try_admit`].

use crate::error::EnrichmentError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A sliding-window request limiter (capacity requests per window).
#[derive(Debug)]
pub struct RateWindow {
    provider: String,
    /// Maximum requests within one window (0 = unlimited).
    capacity: usize,
    window: Duration,
    /// Timestamps of admitted requests, oldest first.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    pub fn new(provider: impl Into<String>, capacity: usize, window: Duration) -> Self {
        Self {
            provider: provider.into(),
            capacity,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a request could be admitted right now.
    ///
    /// Informational only: another caller may take the slot before this one
    /// calls [`admit`](Self::admit). Use [`try_admit`](Self::try_admit) on the
    /// request path.
    pub fn can_admit(&self) -> bool {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, Instant::now());
        self.has_room(&timestamps)
    }

    /// Record one attempted request at the current instant.
    pub fn admit(&self) {
        self.lock().push_back(Instant::now());
    }

    /// Atomically check capacity and record the attempt.
    ///
    /// Fails fast with `RateLimitExceeded` without recording anything when the
    /// window is full. A recorded attempt counts whether or not the request
    /// that follows succeeds.
    pub fn try_admit(&self) -> Result<(), EnrichmentError> {
        let now = Instant::now();
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, now);
        if !self.has_room(&timestamps) {
            return Err(EnrichmentError::RateLimitExceeded {
                provider: self.provider.clone(),
                capacity: self.capacity,
                window_ms: self.window.as_millis() as u64,
            });
        }
        timestamps.push_back(now);
        Ok(())
    }

    /// Number of requests recorded within the current window.
    pub fn in_window(&self) -> usize {
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, Instant::now());
        timestamps.len()
    }

    /// Time until the oldest recorded request leaves the window, if the window is full.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut timestamps = self.lock();
        self.prune(&mut timestamps, now);
        if self.has_room(&timestamps) {
            return None;
        }
        timestamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
    }

    fn has_room(&self, timestamps: &VecDeque<Instant>) -> bool {
        self.capacity == 0 || timestamps.len() < self.capacity
    }

    /// Remove entries older than `now - window`.
    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while timestamps.front().is_some_and(|t| *t < cutoff) {
            timestamps.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
