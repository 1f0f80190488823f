//! Point-in-time statistics snapshot.

use serde::Serialize;

use crate::circuit_breaker::{CircuitState, CircuitStatus};

/// Monitoring view of a manager.
///
/// Fields are read one after another without a global lock, so they are not
/// guaranteed to be mutually consistent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStats {
    /// Requests waiting for admission
    pub queue_size: usize,
    /// Requests waiting out a retry delay
    pub retrying: usize,
    /// Operations currently executing
    pub in_flight: usize,
    /// Admissions in the current rolling second
    pub requests_per_second: u32,
    /// Admissions in the current rolling minute
    pub requests_per_minute: u32,
    /// Live cache entries
    pub cache_size: usize,
    /// `open` or `closed`; half-open reports as `open`
    pub circuit_breaker_status: CircuitStatus,
    /// Detailed breaker state, distinguishing half-open
    pub circuit_breaker_state: CircuitState,
    /// Consecutive terminal failures
    pub failures: u32,
    /// Remaining global pause from a retry-after hint
    pub paused_for_ms: Option<u64>,
    /// Time until a full rate window frees a slot; `None` when neither is full
    pub next_slot_in_ms: Option<u64>,
    /// Total admissions
    pub admitted: u64,
    /// Total successful resolutions from the upstream
    pub succeeded: u64,
    /// Total retries scheduled
    pub retried: u64,
    /// Total upstream failures surfaced to callers
    pub failed: u64,
    /// Total cache hits
    pub cache_hits: u64,
    /// Total cache misses
    pub cache_misses: u64,
    /// Total fast-fails from an open circuit
    pub circuit_rejections: u64,
    /// Total requests discarded by `clear_queue`
    pub cleared: u64,
    /// Total requests removed by `cancel`
    pub cancelled: u64,
}

impl ThrottleStats {
    /// Whether the breaker is refusing new work.
    pub fn is_circuit_open(&self) -> bool {
        self.circuit_breaker_status == CircuitStatus::Open
    }

    /// Logs a one-line summary at info level.
    pub fn log_summary(&self) {
        log::info!(
            "Throttle stats: queued={}, retrying={}, in_flight={}, rps={}, rpm={}, cache={}, circuit={}, failures={}, succeeded={}, failed={}",
            self.queue_size,
            self.retrying,
            self.in_flight,
            self.requests_per_second,
            self.requests_per_minute,
            self.cache_size,
            self.circuit_breaker_state,
            self.failures,
            self.succeeded,
            self.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: CircuitState) -> ThrottleStats {
        ThrottleStats {
            queue_size: 0,
            retrying: 0,
            in_flight: 0,
            requests_per_second: 0,
            requests_per_minute: 0,
            cache_size: 0,
            circuit_breaker_status: state.into(),
            circuit_breaker_state: state,
            failures: 5,
            paused_for_ms: None,
            next_slot_in_ms: None,
            admitted: 0,
            succeeded: 0,
            retried: 0,
            failed: 0,
            cache_hits: 0,
            cache_misses: 0,
            circuit_rejections: 0,
            cleared: 0,
            cancelled: 0,
        }
    }

    #[test]
    fn test_status_serializes_as_open_or_closed() {
        let json = serde_json::to_value(snapshot(CircuitState::HalfOpen)).unwrap();
        assert_eq!(json["circuit_breaker_status"], "open");
        assert_eq!(json["circuit_breaker_state"], "half_open");

        let json = serde_json::to_value(snapshot(CircuitState::Closed)).unwrap();
        assert_eq!(json["circuit_breaker_status"], "closed");
    }

    #[test]
    fn test_half_open_counts_as_open() {
        assert!(snapshot(CircuitState::HalfOpen).is_circuit_open());
        assert!(snapshot(CircuitState::Open).is_circuit_open());
        assert!(!snapshot(CircuitState::Closed).is_circuit_open());
    }
}
