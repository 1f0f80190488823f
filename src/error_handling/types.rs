//! Error type definitions.
//!
//! This module defines the upstream-facing error an operation fails with, the
//! caller-facing error a throttled request resolves to, and initialization errors.

use std::fmt;
use std::time::Duration;

use log::SetLoggerError;
use thiserror::Error;

use crate::config::ConfigError;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// The supplied throttle configuration is unusable.
    #[error("Invalid throttle configuration: {0}")]
    ConfigError(#[from] ConfigError),

    /// Scheduler could not be started (no Tokio runtime available).
    #[error("Scheduler initialization error: {0}")]
    RuntimeError(String),
}

/// Failure reported by an operation for one upstream call.
///
/// Carries the HTTP-like `status` (if the upstream answered), a human-readable
/// `message`, an optional retry-after hint and a `transient` flag for failures
/// that never reached a status (timeouts, refused or reset connections).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamError {
    /// HTTP-like status code
    pub status: Option<u16>,
    /// Description from the upstream or the transport
    pub message: Option<String>,
    /// Upstream-requested pause before any further calls
    pub retry_after: Option<Duration>,
    /// Network or timeout failure with no status
    pub transient: bool,
}

impl UpstreamError {
    /// An error response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// A failure with only a message (no status, not flagged transient).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// The call timed out before the upstream answered.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            transient: true,
            ..Default::default()
        }
    }

    /// The connection failed or was dropped.
    pub fn network(message: impl Into<String>) -> Self {
        Self::timeout(message)
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a retry-after hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.message) {
            (Some(status), Some(message)) => write!(f, "upstream returned {status}: {message}"),
            (Some(status), None) => write!(f, "upstream returned {status}"),
            (None, Some(message)) => write!(f, "upstream call failed: {message}"),
            (None, None) => f.write_str("upstream call failed"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Terminal failure of a throttled request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThrottleError {
    /// The circuit breaker is open; nothing was queued or sent.
    #[error("circuit open after {failures} consecutive failures, retry in {retry_in:?}")]
    CircuitOpen {
        /// Consecutive terminal failures recorded by the breaker
        failures: u32,
        /// Time until probes are let through again
        retry_in: Duration,
    },

    /// Every attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Total attempts made (first call plus retries)
        attempts: u32,
        /// The last underlying error
        #[source]
        source: UpstreamError,
    },

    /// The operation failed with an error that is not worth retrying.
    #[error("{0}")]
    NonRetryable(#[source] UpstreamError),

    /// The request was discarded by `clear_queue` before it executed.
    #[error("request discarded: queue was cleared")]
    QueueCleared,

    /// The request was cancelled before it executed.
    #[error("request cancelled before execution")]
    Cancelled,

    /// The manager shut down before the request completed.
    #[error("throttle manager shut down")]
    ShutDown,
}

impl ThrottleError {
    /// Status code of the underlying upstream error, if any.
    pub fn status(&self) -> Option<u16> {
        self.upstream().and_then(|e| e.status)
    }

    /// Underlying upstream error for `RetriesExhausted` and `NonRetryable`.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            ThrottleError::RetriesExhausted { source, .. } => Some(source),
            ThrottleError::NonRetryable(source) => Some(source),
            _ => None,
        }
    }

    /// Whether this error was produced without ever reaching the upstream.
    pub fn is_rejected_locally(&self) -> bool {
        matches!(
            self,
            ThrottleError::CircuitOpen { .. }
                | ThrottleError::QueueCleared
                | ThrottleError::Cancelled
                | ThrottleError::ShutDown
        )
    }
}
