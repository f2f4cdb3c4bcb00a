//! Pending-request tracking for request-response correlation.
//!
//! # Architecture
//!
//! ```text
//! Request Flow:
//!   1. Generate RequestId
//!   2. Spawn timeout task
//!   3. Register PendingRequest { sender, timer } under the RequestId
//!   4. Broadcast request on the bus
//!   5. Caller awaits ResponseFuture (oneshot::Receiver)
//!
//! Response Flow:
//!   6. Response arrives with clientRequest.requestId
//!   7. Remove entry from PendingRequests (absent → discard)
//!   8. Abort timer, send outcome through oneshot
//!
//! Timeout Flow:
//!   6. Timer elapses
//!   7. Remove entry from PendingRequests (absent → already settled)
//!   8. Send ReplyError::Timeout through oneshot
//! ```
//!
//! Removal from the table is the only way to settle a request, and settling
//! consumes the entry, so each request has at most one outcome.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PenpalError, ReplyError};
use crate::message::RequestId;

/// Outcome delivered to a waiting caller.
pub type Reply = Result<Value, ReplyError>;

/// State for one in-flight request.
pub struct PendingRequest {
    sender: oneshot::Sender<Reply>,
    timer: Option<JoinHandle<()>>,
    start_time: Instant,
}

impl PendingRequest {
    /// Track a request whose outcome goes to `sender`.
    pub fn new(sender: oneshot::Sender<Reply>) -> Self {
        Self {
            sender,
            timer: None,
            start_time: Instant::now(),
        }
    }

    /// Attach the timeout task, aborted when the request settles first.
    pub fn with_timer(mut self, timer: JoinHandle<()>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Time since the request was registered.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Settle the request, cancelling its timer.
    pub fn complete(mut self, result: Reply) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.deliver(result);
    }

    /// Settle the request from its own timer task.
    ///
    /// The timer handle is detached rather than aborted since the caller is
    /// the timer itself.
    fn expire(mut self) {
        self.timer = None;
        self.deliver(Err(ReplyError::Timeout));
    }

    fn deliver(self, result: Reply) {
        let elapsed = self.start_time.elapsed();
        match self.sender.send(result) {
            Ok(()) => {
                tracing::debug!(?elapsed, "PendingRequest: outcome delivered");
            }
            Err(_) => {
                tracing::warn!(?elapsed, "PendingRequest: receiver dropped before outcome");
            }
        }
    }
}

/// Table of in-flight requests keyed by correlation ID.
///
/// Single-threaded: uses `RefCell`, and every borrow ends before an outcome
/// is delivered.
#[derive(Default)]
pub struct PendingRequests {
    requests: RefCell<HashMap<RequestId, PendingRequest>>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request.
    ///
    /// A colliding ID replaces the previous entry, whose caller then observes
    /// [`ReplyError::BrokenPromise`].
    pub fn register(&self, request_id: RequestId, request: PendingRequest) {
        if let Some(previous) = self.requests.borrow_mut().insert(request_id.clone(), request) {
            tracing::warn!(%request_id, "PendingRequests: correlation ID collision");
            if let Some(timer) = previous.timer {
                timer.abort();
            }
        }
    }

    /// Settle the request identified by `request_id`.
    ///
    /// # Errors
    ///
    /// [`PenpalError::UnknownRequestId`] when no such request is pending,
    /// e.g. it already timed out or belongs to another client.
    pub fn complete(&self, request_id: &RequestId, result: Reply) -> Result<(), PenpalError> {
        let request = self
            .requests
            .borrow_mut()
            .remove(request_id)
            .ok_or_else(|| PenpalError::UnknownRequestId(request_id.clone()))?;

        request.complete(result);
        Ok(())
    }

    /// Reject the request with [`ReplyError::Timeout`] if still pending.
    pub fn handle_timeout(&self, request_id: &RequestId) {
        let expired = self.requests.borrow_mut().remove(request_id);
        if let Some(request) = expired {
            tracing::debug!(%request_id, "PendingRequests: request timed out");
            request.expire();
        }
    }

    /// Whether `request_id` is still in flight.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.requests.borrow().contains_key(request_id)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.borrow().is_empty()
    }
}

/// Caller-side handle on a request's eventual outcome.
///
/// Returned immediately by every client call; resolves with the handler's
/// value or rejects with a [`ReplyError`].
#[must_use = "futures do nothing unless awaited"]
pub struct ResponseFuture {
    request_id: RequestId,
    receiver: oneshot::Receiver<Reply>,
}

impl ResponseFuture {
    /// Wrap the receiving half of a pending request.
    pub fn new(request_id: RequestId, receiver: oneshot::Receiver<Reply>) -> Self {
        Self {
            request_id,
            receiver,
        }
    }

    /// Correlation ID of the underlying request.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for ResponseFuture {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(reply),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ReplyError::BrokenPromise)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("request_id", &self.request_id)
            .finish()
    }
}
