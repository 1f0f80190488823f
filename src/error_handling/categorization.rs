//! Error retriability.
//!
//! Splits upstream failures into transient ones worth another attempt and
//! permanent ones that terminate the request immediately.

use crate::config::{
    HTTP_STATUS_OVERLOADED, HTTP_STATUS_SERVER_ERROR_MIN, HTTP_STATUS_TOO_MANY_REQUESTS,
};

use super::types::UpstreamError;

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient; the request may be retried after backoff.
    Retryable,
    /// Permanent; the request fails now.
    NonRetryable,
}

/// Message fragments that mark a status-less failure as a network/timeout problem.
const TRANSIENT_MESSAGE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "econnreset",
    "etimedout",
    "econnrefused",
];

/// Classifies an upstream failure.
///
/// # Retryable
///
/// - 429 (Too Many Requests) and 529 (Overloaded)
/// - Server errors (any status >= 500)
/// - Failures flagged `transient` (timeouts, dropped connections)
/// - Status-less failures whose message names a timeout or connection problem
///
/// # Non-Retryable
///
/// - Client errors (4xx other than 429)
/// - Anything else without a status or a transient indicator
pub fn classify_failure(error: &UpstreamError) -> FailureClass {
    if let Some(status) = error.status {
        if status == HTTP_STATUS_TOO_MANY_REQUESTS || status == HTTP_STATUS_OVERLOADED {
            return FailureClass::Retryable;
        }
        if status >= HTTP_STATUS_SERVER_ERROR_MIN {
            return FailureClass::Retryable;
        }
        return FailureClass::NonRetryable;
    }

    if error.transient {
        return FailureClass::Retryable;
    }

    if let Some(message) = &error.message {
        let msg = message.to_lowercase();
        if TRANSIENT_MESSAGE_PATTERNS.iter().any(|p| msg.contains(p)) {
            return FailureClass::Retryable;
        }
    }

    FailureClass::NonRetryable
}

/// Shorthand for `classify_failure(error) == FailureClass::Retryable`.
pub fn is_retriable_error(error: &UpstreamError) -> bool {
    classify_failure(error) == FailureClass::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retriable_error_429() {
        assert!(is_retriable_error(&UpstreamError::status(429)));
    }

    #[test]
    fn test_is_retriable_error_529_overloaded() {
        assert!(is_retriable_error(&UpstreamError::status(529)));
    }

    #[test]
    fn test_is_retriable_error_server_errors() {
        for status in [500, 502, 503, 504, 599] {
            assert!(
                is_retriable_error(&UpstreamError::status(status)),
                "status {status} should be retriable"
            );
        }
    }

    #[test]
    fn test_is_retriable_error_client_errors() {
        for status in [400, 401, 403, 404, 422] {
            assert!(
                !is_retriable_error(&UpstreamError::status(status)),
                "status {status} should not be retriable"
            );
        }
    }

    #[test]
    fn test_status_wins_over_message() {
        // A 404 whose body mentions a timeout is still a 404
        let err = UpstreamError::status(404).with_message("model timeout config not found");
        assert_eq!(classify_failure(&err), FailureClass::NonRetryable);
    }

    #[test]
    fn test_is_retriable_error_transient_flag() {
        assert!(is_retriable_error(&UpstreamError::timeout("deadline")));
        assert!(is_retriable_error(&UpstreamError::network("broken pipe")));
    }

    #[test]
    fn test_is_retriable_error_timeout_message() {
        assert!(is_retriable_error(&UpstreamError::message(
            "Request timed out after 30s"
        )));
        assert!(is_retriable_error(&UpstreamError::message("ECONNRESET")));
        assert!(is_retriable_error(&UpstreamError::message(
            "Connection refused (os error 111)"
        )));
    }

    #[test]
    fn test_is_retriable_error_unknown() {
        assert!(!is_retriable_error(&UpstreamError::message(
            "invalid prompt template"
        )));
        assert!(!is_retriable_error(&UpstreamError::default()));
    }
}
