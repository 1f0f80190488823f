//! Caller-side handle for a submitted request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::request::RequestId;
use crate::error_handling::ThrottleError;

enum HandleState<T> {
    Ready(Option<Result<T, ThrottleError>>),
    Pending(oneshot::Receiver<Result<T, ThrottleError>>),
}

/// Eventual result of one throttled request.
///
/// Await it to get the value or the terminal error. Dropping it abandons
/// interest in the outcome; the request still runs and the manager is not
/// affected.
pub struct ThrottleHandle<T> {
    id: Option<RequestId>,
    state: HandleState<T>,
}

// No structural pinning: the state is only ever moved out of, never pinned.
impl<T> Unpin for ThrottleHandle<T> {}

impl<T> ThrottleHandle<T> {
    pub(crate) fn ready(result: Result<T, ThrottleError>) -> Self {
        ThrottleHandle {
            id: None,
            state: HandleState::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(id: RequestId, rx: oneshot::Receiver<Result<T, ThrottleError>>) -> Self {
        ThrottleHandle {
            id: Some(id),
            state: HandleState::Pending(rx),
        }
    }

    /// Queue id, or `None` if the request resolved without being queued
    /// (cache hit or open circuit).
    pub fn id(&self) -> Option<RequestId> {
        self.id
    }
}

impl<T> Future for ThrottleHandle<T> {
    type Output = Result<T, ThrottleError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            // Polling again after completion reports the manager as gone
            HandleState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(ThrottleError::ShutDown)))
            }
            // A dropped sender means the manager went away without resolving
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(ThrottleError::ShutDown))),
        }
    }
}
