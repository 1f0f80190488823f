//! Sliding log of admissions for one window duration.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Admission log for a single window (e.g. one second or one minute).
///
/// Keeps the instant of every admission still inside the window. Entries at
/// least `duration` old are pruned before every consult, so `count` is always
/// the number of admissions in the rolling window ending now.
#[derive(Debug)]
pub(crate) struct RateWindow {
    admissions: VecDeque<Instant>,
    limit: u32,
    duration: Duration,
}

impl RateWindow {
    pub(crate) fn new(limit: u32, duration: Duration) -> Self {
        RateWindow {
            admissions: VecDeque::with_capacity(limit as usize),
            limit,
            duration,
        }
    }

    /// Drops admissions that have left the window.
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(front) = self.admissions.front() {
            if now.saturating_duration_since(*front) >= self.duration {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admissions inside the window ending at `now`.
    pub(crate) fn count(&mut self, now: Instant) -> u32 {
        self.prune(now);
        self.admissions.len() as u32
    }

    pub(crate) fn has_capacity(&mut self, now: Instant) -> bool {
        self.count(now) < self.limit
    }

    /// Records an admission. Callers check capacity first.
    pub(crate) fn record(&mut self, now: Instant) {
        self.prune(now);
        self.admissions.push_back(now);
    }

    /// When the oldest admission leaves the window, if any are tracked.
    pub(crate) fn reset_at(&mut self, now: Instant) -> Option<Instant> {
        self.prune(now);
        self.admissions.front().map(|t| *t + self.duration)
    }

    pub(crate) fn limit(&self) -> u32 {
        self.limit
    }

    /// Changes the limit; already-recorded admissions still count against it.
    pub(crate) fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_counts_admissions() {
        let mut window = RateWindow::new(3, Duration::from_secs(1));
        let now = Instant::now();

        assert_eq!(window.count(now), 0);
        assert!(window.has_capacity(now));

        window.record(now);
        window.record(now);
        assert_eq!(window.count(now), 2);
        assert!(window.has_capacity(now));

        window.record(now);
        assert_eq!(window.count(now), 3);
        assert!(!window.has_capacity(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_exactly_at_duration() {
        let mut window = RateWindow::new(1, Duration::from_secs(1));
        let start = Instant::now();
        window.record(start);

        assert!(!window.has_capacity(start + Duration::from_millis(999)));
        assert!(window.has_capacity(start + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_partial_expiration() {
        let mut window = RateWindow::new(10, Duration::from_millis(100));
        let start = Instant::now();

        window.record(start);
        window.record(start);
        window.record(start + Duration::from_millis(50));
        window.record(start + Duration::from_millis(60));

        assert_eq!(window.count(start + Duration::from_millis(60)), 4);
        // First two leave the window at +100ms
        assert_eq!(window.count(start + Duration::from_millis(110)), 2);
        assert_eq!(window.count(start + Duration::from_millis(200)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_at_tracks_oldest() {
        let mut window = RateWindow::new(5, Duration::from_secs(60));
        let start = Instant::now();
        assert_eq!(window.reset_at(start), None);

        window.record(start);
        window.record(start + Duration::from_secs(10));
        assert_eq!(window.reset_at(start), Some(start + Duration::from_secs(60)));
        assert_eq!(
            window.reset_at(start + Duration::from_secs(61)),
            Some(start + Duration::from_secs(70))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_lowered_limit_blocks_until_drained() {
        let mut window = RateWindow::new(5, Duration::from_secs(1));
        let now = Instant::now();
        for _ in 0..3 {
            window.record(now);
        }
        window.set_limit(2);
        assert_eq!(window.limit(), 2);
        assert!(!window.has_capacity(now));
        assert!(window.has_capacity(now + Duration::from_secs(1)));
    }
}
