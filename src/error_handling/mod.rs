//! Error handling and request statistics.
//!
//! This module provides:
//! - Error type definitions for upstream failures and throttled requests
//! - Retry classification of upstream failures
//! - Conversions from `reqwest` failures and responses
//! - Cumulative event counters
//!
//! Upstream failures are categorized into:
//! - **Retryable**: rate limiting (429/529), server errors, timeouts and
//!   connection failures
//! - **Non-retryable**: everything else, surfaced to the caller unchanged

mod categorization;
mod stats;
mod types;
mod upstream;

// Re-export public API
pub use categorization::{classify_failure, is_retriable_error, FailureClass};
pub use stats::{EventCounters, ThrottleEvent};
pub use types::{InitializationError, ThrottleError, UpstreamError};
pub use upstream::parse_retry_after;
