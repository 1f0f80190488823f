//! Circuit breaker for the upstream.
//!
//! Stops sending load to an upstream that keeps failing. After N consecutive
//! terminal failures the circuit opens and every new request fails fast. Once a
//! cooldown has passed since the last failure, a bounded number of probe
//! requests is let through one at a time; the first successful probe closes
//! the circuit, a failed one re-opens it and restarts the cooldown.
//!
//! State is derived lazily from the failure count and timestamps on every
//! check, so no timer task is needed.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{
    DEFAULT_CIRCUIT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_MAX_PROBES,
};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast until the cooldown elapses
    Open,
    /// Cooldown elapsed; probes may test the upstream
    HalfOpen,
}

impl CircuitState {
    /// Returns the lowercase name used in logs and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-valued breaker status reported in stats.
///
/// Half-open counts as open: the breaker is not closed until a probe succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitStatus {
    Closed,
    Open,
}

impl From<CircuitState> for CircuitStatus {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => CircuitStatus::Closed,
            CircuitState::Open | CircuitState::HalfOpen => CircuitStatus::Open,
        }
    }
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
        })
    }
}

/// Scheduler-side admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; admit normally.
    Allowed,
    /// Circuit half-open; this admission is the single in-flight probe.
    Probe,
    /// Nothing may be admitted right now.
    Rejected,
}

/// Reason a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen {
    /// Consecutive terminal failures recorded
    pub failures: u32,
    /// Time until probes are let through again
    pub retry_in: Duration,
}

#[derive(Debug)]
struct BreakerInner {
    failure_threshold: u32,
    cooldown: Duration,
    max_probes: u32,
    failure_count: u32,
    /// Start of the current cooldown: last failure, or when the probe budget ran out
    cooldown_from: Option<Instant>,
    probes_used: u32,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn state(&self, now: Instant) -> CircuitState {
        if self.failure_count < self.failure_threshold {
            return CircuitState::Closed;
        }
        match self.cooldown_from {
            Some(from) if now.saturating_duration_since(from) >= self.cooldown => {
                CircuitState::HalfOpen
            }
            _ => CircuitState::Open,
        }
    }

    fn retry_in(&self, now: Instant) -> Duration {
        self.cooldown_from
            .map(|from| self.cooldown.saturating_sub(now.saturating_duration_since(from)))
            .unwrap_or_default()
    }
}

/// Three-state circuit breaker.
///
/// Tracks consecutive terminal failures. The threshold, cooldown and probe
/// bound can be changed at runtime without losing the current count.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with default settings.
    ///
    /// Defaults:
    /// - Failure threshold: 5 consecutive failures
    /// - Cooldown: 30 seconds
    /// - Probes per cooldown: 3
    pub fn new() -> Self {
        Self::with_threshold(
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_CIRCUIT_COOLDOWN,
            DEFAULT_HALF_OPEN_MAX_PROBES,
        )
    }

    /// Creates a new circuit breaker with custom settings.
    ///
    /// # Arguments
    ///
    /// * `failure_threshold` - Consecutive failures before opening the circuit
    /// * `cooldown` - Time since the last failure before probing starts
    /// * `max_probes` - Probe admissions allowed per cooldown period
    pub fn with_threshold(failure_threshold: u32, cooldown: Duration, max_probes: u32) -> Self {
        CircuitBreaker {
            inner: Mutex::new(BreakerInner {
                failure_threshold,
                cooldown,
                max_probes,
                failure_count: 0,
                cooldown_from: None,
                probes_used: 0,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, evaluated at call time.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state(Instant::now())
    }

    /// Gets the current consecutive failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Submission-time check: fails fast only while fully open.
    ///
    /// Half-open lets submissions queue up; the scheduler decides which one
    /// becomes the probe.
    pub async fn check_submission(&self) -> Result<(), CircuitOpen> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        match inner.state(now) {
            CircuitState::Open => Err(CircuitOpen {
                failures: inner.failure_count,
                retry_in: inner.retry_in(now),
            }),
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Whether the scheduler could admit anything right now (no side effects).
    pub async fn can_admit(&self) -> bool {
        let inner = self.inner.lock().await;
        match inner.state(Instant::now()) {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                !inner.probe_in_flight && inner.probes_used < inner.max_probes
            }
            CircuitState::Open => false,
        }
    }

    /// Scheduler-time check that also claims the probe slot when half-open.
    pub async fn try_admit(&self) -> Admission {
        let mut inner = self.inner.lock().await;
        match inner.state(Instant::now()) {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen
                if !inner.probe_in_flight && inner.probes_used < inner.max_probes =>
            {
                inner.probes_used += 1;
                inner.probe_in_flight = true;
                log::info!(
                    "Circuit breaker: half-open, admitting probe {}/{}",
                    inner.probes_used,
                    inner.max_probes
                );
                Admission::Probe
            }
            CircuitState::HalfOpen | CircuitState::Open => Admission::Rejected,
        }
    }

    /// Records a successful operation.
    ///
    /// Resets the failure count and probe budget, closing the circuit.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        let previous = inner.state(Instant::now());
        inner.failure_count = 0;
        inner.cooldown_from = None;
        inner.probes_used = 0;
        inner.probe_in_flight = false;
        if previous != CircuitState::Closed {
            log::info!("Circuit breaker: circuit closed after successful request");
        }
    }

    /// Records a terminal failure.
    ///
    /// Increments the failure count and restarts the cooldown. `was_probe`
    /// frees the probe slot; a failed probe keeps the circuit open.
    pub async fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.cooldown_from = Some(now);
        if was_probe {
            inner.probe_in_flight = false;
            inner.probes_used = 0;
            log::warn!(
                "Circuit breaker: probe failed, circuit stays open (cooldown: {}s)",
                inner.cooldown.as_secs()
            );
        } else if inner.failure_count == inner.failure_threshold {
            log::error!(
                "Circuit breaker: circuit opened after {} consecutive failures (cooldown: {}s)",
                inner.failure_count,
                inner.cooldown.as_secs()
            );
        }
    }

    /// Records a probe that failed with a retryable error.
    ///
    /// The request is not terminal yet, so the failure count is unchanged, but
    /// the circuit goes back to open and the cooldown restarts.
    pub async fn fail_probe(&self) {
        let mut inner = self.inner.lock().await;
        inner.probe_in_flight = false;
        inner.probes_used = 0;
        inner.cooldown_from = Some(Instant::now());
        log::warn!(
            "Circuit breaker: probe failed, circuit stays open (cooldown: {}s)",
            inner.cooldown.as_secs()
        );
    }

    /// Returns a probe slot claimed by [`try_admit`](Self::try_admit) that was
    /// never used, without spending the probe budget.
    pub async fn cancel_probe(&self) {
        let mut inner = self.inner.lock().await;
        if inner.probe_in_flight {
            inner.probe_in_flight = false;
            inner.probes_used = inner.probes_used.saturating_sub(1);
        }
    }

    /// Applies new settings; the failure history is kept.
    pub async fn set_policy(&self, failure_threshold: u32, cooldown: Duration, max_probes: u32) {
        let mut inner = self.inner.lock().await;
        inner.failure_threshold = failure_threshold;
        inner.cooldown = cooldown;
        inner.max_probes = max_probes;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_opens_after_threshold() {
        let cb = CircuitBreaker::with_threshold(3, Duration::from_millis(100), 3);

        cb.record_failure(false).await;
        cb.record_failure(false).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.check_submission().await.is_ok());
        assert_eq!(cb.failure_count().await, 2);

        cb.record_failure(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        let open = cb.check_submission().await.unwrap_err();
        assert_eq!(open.failures, 3);
        assert_eq!(open.retry_in, Duration::from_millis(100));
        assert_eq!(cb.try_admit().await, Admission::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_resets_on_success() {
        let cb = CircuitBreaker::with_threshold(3, Duration::from_millis(100), 3);

        cb.record_failure(false).await;
        cb.record_failure(false).await;
        cb.record_success().await;
        assert_eq!(cb.failure_count().await, 0);

        // Needs a full new run of failures to open
        cb.record_failure(false).await;
        cb.record_failure(false).await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cooldown() {
        let cb = CircuitBreaker::with_threshold(2, Duration::from_millis(50), 3);
        cb.record_failure(false).await;
        cb.record_failure(false).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(cb.check_submission().await.is_ok());
        assert!(cb.can_admit().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_flight() {
        let cb = CircuitBreaker::with_threshold(1, Duration::from_millis(50), 3);
        cb.record_failure(false).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(cb.try_admit().await, Admission::Probe);
        assert_eq!(cb.try_admit().await, Admission::Rejected);
        assert!(!cb.can_admit().await);
        // Submissions still queue while the probe runs
        assert!(cb.check_submission().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_probe_closes_circuit() {
        let cb = CircuitBreaker::with_threshold(1, Duration::from_millis(50), 3);
        cb.record_failure(false).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(cb.try_admit().await, Admission::Probe);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.failure_count().await, 0);
        assert_eq!(cb.try_admit().await, Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_restarts_cooldown() {
        let cb = CircuitBreaker::with_threshold(1, Duration::from_millis(50), 3);
        cb.record_failure(false).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(cb.try_admit().await, Admission::Probe);
        cb.record_failure(true).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(cb.check_submission().await.is_err());

        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert_eq!(cb.try_admit().await, Admission::Probe);
    }

    #[test]
    fn test_half_open_reports_open_status() {
        assert_eq!(CircuitStatus::from(CircuitState::Closed), CircuitStatus::Closed);
        assert_eq!(CircuitStatus::from(CircuitState::Open), CircuitStatus::Open);
        assert_eq!(CircuitStatus::from(CircuitState::HalfOpen), CircuitStatus::Open);
        assert_eq!(CircuitStatus::Open.to_string(), "open");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_half_open_failure_reopens() {
        let cb = CircuitBreaker::with_threshold(1, Duration::from_millis(50), 3);
        cb.record_failure(false).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(cb.try_admit().await, Admission::Probe);
        cb.fail_probe().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(cb.failure_count().await, 1);
        let open = cb.check_submission().await.unwrap_err();
        assert_eq!(open.retry_in, Duration::from_millis(50));
        assert_eq!(cb.try_admit().await, Admission::Rejected);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.try_admit().await, Admission::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_probe_refunds_budget() {
        let cb = CircuitBreaker::with_threshold(1, Duration::from_millis(50), 1);
        cb.record_failure(false).await;
        sleep(Duration::from_millis(60)).await;

        assert_eq!(cb.try_admit().await, Admission::Probe);
        cb.cancel_probe().await;
        assert_eq!(cb.try_admit().await, Admission::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_policy_keeps_history() {
        let cb = CircuitBreaker::with_threshold(5, Duration::from_secs(30), 3);
        cb.record_failure(false).await;
        cb.record_failure(false).await;
        cb.set_policy(2, Duration::from_secs(30), 3).await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[test]
    fn test_circuit_state_names() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");
        assert_eq!(
            serde_json::to_string(&CircuitState::Open).unwrap(),
            "\"open\""
        );
    }
}
