//! Wire messages exchanged between clients and servers.
//!
//! # Addressing
//!
//! ```text
//! channel "Request.<server>"   topic "<handler>"   payload RequestMessage
//! channel "Response.<server>"  topic "<handler>"   payload ResponseMessage
//! ```
//!
//! Two servers sharing a name share channels and will answer each other's
//! requests.
//!
//! # Payload shape
//!
//! ```text
//! RequestMessage  { instanceName, clientName, requestId, args: [..] }
//! ResponseMessage { clientRequest: RequestMessage, responseData }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PenpalError;
use crate::id::generate_id;

/// Prefix of the channel carrying requests to a server.
pub const REQUEST_CHANNEL_PREFIX: &str = "Request";

/// Prefix of the channel carrying responses from a server.
pub const RESPONSE_CHANNEL_PREFIX: &str = "Response";

/// Channel on which requests to `server_name` are broadcast.
pub fn request_channel(server_name: &str) -> String {
    format!("{REQUEST_CHANNEL_PREFIX}.{server_name}")
}

/// Channel on which responses from `server_name` are broadcast.
pub fn response_channel(server_name: &str) -> String {
    format!("{RESPONSE_CHANNEL_PREFIX}.{server_name}")
}

/// Correlation ID carried by a request and echoed in its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Draw a fresh random request ID.
    pub fn generate() -> Self {
        Self(generate_id())
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reserved protocol outcomes, distinct from any handler value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    /// The handler explicitly rejected the request.
    Invalid,

    /// No response arrived in time. Synthesized by the client.
    Timeout,
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseCode::Invalid => f.write_str("INVALID"),
            ResponseCode::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

/// What a handler returns: an ordinary value or a response code.
///
/// Encoded externally tagged, so `{"value": ..}` and `{"code": "INVALID"}`
/// can never be mistaken for one another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseData {
    /// Successful handler result.
    Value(Value),

    /// Protocol-level outcome.
    Code(ResponseCode),
}

impl ResponseData {
    /// Shorthand for `ResponseData::Code(ResponseCode::Invalid)`.
    pub fn invalid() -> Self {
        ResponseData::Code(ResponseCode::Invalid)
    }

    /// The response code, if this is not an ordinary value.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            ResponseData::Value(_) => None,
            ResponseData::Code(code) => Some(*code),
        }
    }
}

impl From<Value> for ResponseData {
    fn from(value: Value) -> Self {
        ResponseData::Value(value)
    }
}

impl From<ResponseCode> for ResponseData {
    fn from(code: ResponseCode) -> Self {
        ResponseData::Code(code)
    }
}

impl From<String> for ResponseData {
    fn from(value: String) -> Self {
        ResponseData::Value(Value::String(value))
    }
}

impl From<&str> for ResponseData {
    fn from(value: &str) -> Self {
        ResponseData::Value(Value::String(value.to_string()))
    }
}

/// A client's request for one handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    /// Instance the request targets. Resolved by the server on arrival.
    pub instance_name: String,

    /// Issuing client, for attribution only.
    pub client_name: String,

    /// Correlation ID.
    pub request_id: RequestId,

    /// Positional handler arguments.
    pub args: Vec<Value>,
}

impl RequestMessage {
    /// Decode a request from a bus payload.
    pub fn from_payload(payload: Value) -> Result<Self, PenpalError> {
        Ok(serde_json::from_value(payload)?)
    }

    /// Encode this request as a bus payload.
    pub fn to_payload(&self) -> Result<Value, PenpalError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A server's answer, echoing the originating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    /// The request being answered.
    pub client_request: RequestMessage,

    /// Handler result or response code.
    pub response_data: ResponseData,
}

impl ResponseMessage {
    /// Decode a response from a bus payload.
    pub fn from_payload(payload: Value) -> Result<Self, PenpalError> {
        Ok(serde_json::from_value(payload)?)
    }

    /// Encode this response as a bus payload.
    pub fn to_payload(&self) -> Result<Value, PenpalError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Correlation ID of the answered request.
    pub fn request_id(&self) -> &RequestId {
        &self.client_request.request_id
    }
}
