//! Queued request records and submission options.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error_handling::{ThrottleError, UpstreamError};

/// Identifier assigned to a request when it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    /// Numeric value, unique per manager.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Type-erased unit of work; called once per attempt.
pub(crate) type Operation<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, UpstreamError>> + Send + Sync>;

/// Per-call options for [`ThrottleManager::throttle`](crate::ThrottleManager::throttle).
///
/// # Examples
///
/// ```
/// use api_throttle::ThrottleOptions;
///
/// let options = ThrottleOptions::new().cache_key("summary:42").priority(5);
/// assert_eq!(options.priority, 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Key under which a successful result is cached and looked up
    pub cache_key: Option<String>,
    /// Higher values are admitted first; default 0
    pub priority: i32,
    /// Bypass the cache lookup (a successful result still refreshes the entry)
    pub skip_cache: bool,
}

impl ThrottleOptions {
    /// Default options: no cache key, priority 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache key.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Skips the cache lookup for this call.
    pub fn skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }
}

/// One pending unit of work, owned by the manager until it resolves.
pub(crate) struct QueuedRequest<T> {
    pub(crate) id: RequestId,
    pub(crate) operation: Operation<T>,
    pub(crate) priority: i32,
    pub(crate) retries: u32,
    pub(crate) enqueued_at: Instant,
    pub(crate) cache_key: Option<String>,
    responder: oneshot::Sender<Result<T, ThrottleError>>,
}

impl<T> QueuedRequest<T> {
    pub(crate) fn new(
        id: RequestId,
        operation: Operation<T>,
        options: ThrottleOptions,
        responder: oneshot::Sender<Result<T, ThrottleError>>,
    ) -> Self {
        QueuedRequest {
            id,
            operation,
            priority: options.priority,
            retries: 0,
            enqueued_at: Instant::now(),
            cache_key: options.cache_key,
            responder,
        }
    }

    /// Delivers the terminal result. Consumes the request, so it fires once.
    pub(crate) fn resolve(self, result: Result<T, ThrottleError>) {
        let id = self.id;
        let waited = self.enqueued_at.elapsed();
        if self.responder.send(result).is_err() {
            // Caller dropped its handle; nothing is waiting for the outcome
            log::debug!("{} resolved after {:?} with no caller waiting", id, waited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop_operation() -> Operation<u32> {
        Arc::new(|| async { Ok(1) }.boxed())
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(17).to_string(), "req-17");
        assert_eq!(RequestId(17).as_u64(), 17);
    }

    #[test]
    fn test_options_builder() {
        let options = ThrottleOptions::new()
            .cache_key("k")
            .priority(-2)
            .skip_cache(true);
        assert_eq!(options.cache_key.as_deref(), Some("k"));
        assert_eq!(options.priority, -2);
        assert!(options.skip_cache);
        assert_eq!(ThrottleOptions::new().priority, 0);
    }

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let request = QueuedRequest::new(
            RequestId(1),
            noop_operation(),
            ThrottleOptions::new().priority(3),
            tx,
        );
        assert_eq!(request.priority, 3);
        assert_eq!(request.retries, 0);
        request.resolve(Err(ThrottleError::Cancelled));
        assert_eq!(rx.await.unwrap(), Err(ThrottleError::Cancelled));
    }

    #[tokio::test]
    async fn test_resolve_with_dropped_receiver_is_silent() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let request = QueuedRequest::new(RequestId(2), noop_operation(), ThrottleOptions::new(), tx);
        request.resolve(Ok(5));
    }
}
