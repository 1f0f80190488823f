//! Configuration constants.
//!
//! Defaults used by [`ThrottleConfig::default`](super::ThrottleConfig) and the
//! scheduler internals.

use std::time::Duration;

// Rate limits
/// Maximum admissions inside any rolling one-second window
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 5;
/// Maximum admissions inside any rolling one-minute window
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 50;
/// Length of the short rate window
pub const SECOND_WINDOW: Duration = Duration::from_secs(1);
/// Length of the long rate window
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

// Retry and backoff
/// Retries after the first attempt (total attempts = retries + 1)
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Delay before the first retry
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Upper bound on any single backoff delay (before jitter)
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(32_000);
/// Longest server-requested pause honored; larger `Retry-After` values are clamped
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
/// Growth factor between successive retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
/// Symmetric jitter as a fraction of the computed delay (0.1 = ±10%)
pub const DEFAULT_JITTER_RANGE: f64 = 0.1;

// Cache
/// Time-to-live of a cached result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);
/// How often expired cache entries are swept proactively
pub const DEFAULT_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Cache capacity; inserting beyond it evicts the oldest entry
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

// Circuit breaker
/// Consecutive terminal failures that open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Time since the last failure before probes are let through
pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_secs(30);
/// Probe admissions allowed per cooldown period while half-open
pub const DEFAULT_HALF_OPEN_MAX_PROBES: u32 = 3;

// Scheduler
/// Scheduler loop tick
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

// HTTP status codes the retry classifier cares about
/// Too Many Requests
pub const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;
/// Non-standard "overloaded" status returned by some AI providers
pub const HTTP_STATUS_OVERLOADED: u16 = 529;
/// First server-error status; everything at or above it is retried
pub const HTTP_STATUS_SERVER_ERROR_MIN: u16 = 500;
