//! api_throttle: client-side admission control for rate-limited upstream APIs
//!
//! Wraps calls to an upstream (typically an AI completion endpoint) in a
//! resilience layer: every call is queued by priority, admitted only while both
//! a per-second and a per-minute rolling window have room, retried with
//! exponential backoff and jitter on transient failures, short-circuited while
//! the upstream looks down, and optionally served from a TTL cache.
//!
//! # Example
//!
//! ```no_run
//! use api_throttle::{ThrottleConfig, ThrottleError, ThrottleManager, ThrottleOptions, UpstreamError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager: ThrottleManager<String> = ThrottleManager::new(ThrottleConfig::for_ai_endpoint())?;
//!
//! let result = manager
//!     .throttle(
//!         || async {
//!             // Call the upstream here and map failures to UpstreamError
//!             Err::<String, _>(UpstreamError::status(503))
//!         },
//!         ThrottleOptions::new().priority(1),
//!     )
//!     .await;
//!
//! if let Err(ThrottleError::RetriesExhausted { attempts, source }) = &result {
//!     println!("gave up after {attempts} attempts: {source}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. [`ThrottleManager::new`] spawns the
//! scheduler loop on the current runtime and fails if there is none.

#![warn(missing_docs)]

pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
mod error_handling;
pub mod initialization;
mod manager;
mod queue;
pub mod rate_window;

// Re-export public API
pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use config::{ConfigError, ConfigUpdate, LogFormat, LogLevel, ThrottleConfig};
pub use error_handling::{
    classify_failure, is_retriable_error, parse_retry_after, FailureClass, InitializationError,
    ThrottleError, ThrottleEvent, UpstreamError,
};
pub use manager::{RequestId, ThrottleHandle, ThrottleManager, ThrottleOptions, ThrottleStats};
