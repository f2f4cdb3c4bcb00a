//! Error types for penpal.
//!
//! - [`ReplyError`]: how a single request settles when it does not resolve
//! - [`PenpalError`]: failures of the local API (unknown handler names,
//!   unknown correlation IDs, payload encoding)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{RequestId, ResponseCode};

/// Outcome of a request that did not resolve with a value.
///
/// These errors are serializable so they can be forwarded by hosts that
/// relay results elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyError {
    /// No response arrived before the client's timeout.
    ///
    /// The handler may still be running, or may never have run because the
    /// target instance does not exist.
    Timeout,

    /// The handler answered with [`ResponseCode::Invalid`].
    Invalid,

    /// The pending entry was dropped without an outcome.
    ///
    /// Only happens when the runtime driving the client shuts down.
    BrokenPromise,
}

impl ReplyError {
    /// The protocol response code behind this error, if any.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            ReplyError::Timeout => Some(ResponseCode::Timeout),
            ReplyError::Invalid => Some(ResponseCode::Invalid),
            ReplyError::BrokenPromise => None,
        }
    }
}

impl From<ResponseCode> for ReplyError {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::Invalid => ReplyError::Invalid,
            ResponseCode::Timeout => ReplyError::Timeout,
        }
    }
}

impl std::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyError::Timeout => write!(f, "request timed out"),
            ReplyError::Invalid => write!(f, "handler rejected request as invalid"),
            ReplyError::BrokenPromise => write!(f, "request dropped without reply"),
        }
    }
}

impl std::error::Error for ReplyError {}

/// Errors raised by the local client/server API.
#[derive(Debug, Error)]
pub enum PenpalError {
    /// The handler name was not known when the client was constructed.
    #[error("Unknown request handler: {0}")]
    UnknownMethod(String),

    /// No pending request carries this correlation ID (late or foreign response).
    #[error("Unknown request ID: {0}")]
    UnknownRequestId(RequestId),

    /// A bus payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
