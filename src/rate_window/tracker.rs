//! Per-second and per-minute admission accounting.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::window::RateWindow;
use crate::config::{MINUTE_WINDOW, SECOND_WINDOW};

#[derive(Debug)]
struct Windows {
    second: RateWindow,
    minute: RateWindow,
}

/// Thread-safe pair of rolling rate windows.
///
/// Answers "may one more request be admitted now?" and records the admission
/// atomically, so the scheduler never exceeds either limit.
#[derive(Debug)]
pub struct RateWindowTracker {
    windows: Mutex<Windows>,
}

impl RateWindowTracker {
    /// Creates a tracker with the given per-second and per-minute limits.
    pub fn new(per_second: u32, per_minute: u32) -> Self {
        Self::with_durations(per_second, SECOND_WINDOW, per_minute, MINUTE_WINDOW)
    }

    pub(crate) fn with_durations(
        per_second: u32,
        second: Duration,
        per_minute: u32,
        minute: Duration,
    ) -> Self {
        RateWindowTracker {
            windows: Mutex::new(Windows {
                second: RateWindow::new(per_second, second),
                minute: RateWindow::new(per_minute, minute),
            }),
        }
    }

    /// Admits one request if both windows have spare capacity.
    ///
    /// Both counters are incremented on admission, not on completion.
    pub async fn try_admit(&self) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        if !windows.second.has_capacity(now) || !windows.minute.has_capacity(now) {
            return false;
        }
        windows.second.record(now);
        windows.minute.record(now);
        true
    }

    /// Whether an admission would succeed right now (no side effects).
    pub async fn has_capacity(&self) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        windows.second.has_capacity(now) && windows.minute.has_capacity(now)
    }

    /// Admissions in the current rolling second and minute.
    pub async fn counts(&self) -> (u32, u32) {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        (windows.second.count(now), windows.minute.count(now))
    }

    /// Earliest instant at which a full window frees a slot.
    ///
    /// `None` when neither window is full.
    pub async fn next_slot(&self) -> Option<Instant> {
        let mut guard = self.windows.lock().await;
        let windows = &mut *guard;
        let now = Instant::now();
        let mut next = None;
        for window in [&mut windows.second, &mut windows.minute] {
            if !window.has_capacity(now) {
                let at = window.reset_at(now);
                next = next.max(at);
            }
        }
        next
    }

    /// Applies new limits; history is kept.
    pub async fn set_limits(&self, per_second: u32, per_minute: u32) {
        let mut windows = self.windows.lock().await;
        windows.second.set_limit(per_second);
        windows.minute.set_limit(per_minute);
    }

    /// Current `(per_second, per_minute)` limits.
    pub async fn limits(&self) -> (u32, u32) {
        let windows = self.windows.lock().await;
        (windows.second.limit(), windows.minute.limit())
    }
}
