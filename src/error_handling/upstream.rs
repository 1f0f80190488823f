//! Conversions from HTTP client failures into [`UpstreamError`].
//!
//! Operations that talk to the upstream through `reqwest` can map transport
//! errors with `?` and error responses with [`UpstreamError::from_response_parts`].

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use super::types::UpstreamError;
use crate::config::MAX_RETRY_AFTER;

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16());
        // Network-related errors never produced a response
        let transient =
            status.is_none() && (error.is_timeout() || error.is_connect() || error.is_request());
        UpstreamError {
            status,
            message: Some(error.to_string()),
            retry_after: None,
            transient,
        }
    }
}

impl UpstreamError {
    /// Builds an error from a non-success response.
    ///
    /// `Retry-After` is honored when it holds a number of seconds; HTTP-date
    /// values are ignored. An empty `body` leaves the message unset.
    pub fn from_response_parts(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let body = body.trim();
        UpstreamError {
            status: Some(status.as_u16()),
            message: (!body.is_empty()).then(|| body.to_string()),
            retry_after: parse_retry_after(headers),
            transient: false,
        }
    }
}

/// Reads a `Retry-After` header expressed in (possibly fractional) seconds.
///
/// Values above [`MAX_RETRY_AFTER`] are clamped to it.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
    Some(delay.min(MAX_RETRY_AFTER))
}
