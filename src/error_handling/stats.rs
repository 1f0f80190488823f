//! Throttle event counters.
//!
//! Thread-safe cumulative counters for everything that happens to requests
//! passing through a manager: admissions, outcomes, cache traffic and local
//! rejections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;

/// Countable events in a request's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ThrottleEvent {
    /// Left the queue and started executing
    Admitted,
    /// Resolved with a value from the upstream
    Succeeded,
    /// Failed with a retryable error and was parked for backoff
    Retried,
    /// Resolved with an upstream failure (exhausted or non-retryable)
    Failed,
    /// Answered from the cache
    CacheHit,
    /// Had a cache key but no live entry
    CacheMiss,
    /// Rejected because the circuit was open
    CircuitRejected,
    /// Discarded by `clear_queue`
    Cleared,
    /// Removed by `cancel`
    Cancelled,
}

impl ThrottleEvent {
    /// Returns a human-readable name for the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleEvent::Admitted => "admitted",
            ThrottleEvent::Succeeded => "succeeded",
            ThrottleEvent::Retried => "retried",
            ThrottleEvent::Failed => "failed",
            ThrottleEvent::CacheHit => "cache hit",
            ThrottleEvent::CacheMiss => "cache miss",
            ThrottleEvent::CircuitRejected => "circuit rejected",
            ThrottleEvent::Cleared => "cleared",
            ThrottleEvent::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ThrottleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe event counter map.
///
/// Every [`ThrottleEvent`] is initialized to zero on creation, so increments
/// never allocate and reads never miss.
pub struct EventCounters {
    counts: HashMap<ThrottleEvent, AtomicU64>,
}

impl EventCounters {
    /// Creates counters with every event at zero.
    pub fn new() -> Self {
        let mut counts = HashMap::new();
        for event in ThrottleEvent::iter() {
            counts.insert(event, AtomicU64::new(0));
        }
        EventCounters { counts }
    }

    /// Increment an event counter.
    pub fn increment(&self, event: ThrottleEvent) {
        self.add(event, 1);
    }

    /// Add `n` to an event counter.
    pub fn add(&self, event: ThrottleEvent, n: u64) {
        if let Some(counter) = self.counts.get(&event) {
            counter.fetch_add(n, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment counter for {:?} which is not in the map. \
                 This indicates a bug in EventCounters initialization.",
                event
            );
        }
    }

    /// Get the count for an event.
    pub fn get(&self, event: ThrottleEvent) -> u64 {
        self.counts
            .get(&event)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for EventCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = EventCounters::new();
        for event in ThrottleEvent::iter() {
            assert_eq!(counters.get(event), 0, "{event} should start at 0");
        }
    }

    #[test]
    fn test_increment_and_add() {
        let counters = EventCounters::new();
        counters.increment(ThrottleEvent::Admitted);
        counters.increment(ThrottleEvent::Admitted);
        counters.add(ThrottleEvent::Cleared, 5);
        assert_eq!(counters.get(ThrottleEvent::Admitted), 2);
        assert_eq!(counters.get(ThrottleEvent::Cleared), 5);
        assert_eq!(counters.get(ThrottleEvent::Failed), 0);
    }

    #[test]
    fn test_concurrent_increments() {
        use std::sync::Arc;
        let counters = Arc::new(EventCounters::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        counters.increment(ThrottleEvent::Succeeded);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("counter thread panicked");
        }
        assert_eq!(counters.get(ThrottleEvent::Succeeded), 1000);
    }
}
