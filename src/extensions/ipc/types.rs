//! Message shapes exchanged with an isolated extension surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INVOKE_REQUEST: &str = "INVOKE_REQUEST";
pub const INVOKE_RESPONSE: &str = "INVOKE_RESPONSE";
pub const INVOKE_ERROR: &str = "INVOKE_ERROR";

/// A capability request posted by extension script.
///
/// `{ "type": "INVOKE_REQUEST", "command": "...", "payload": {...} }`, with an
/// optional `id` echoed back in the reply so scripts can correlate
/// concurrent requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

/// How an inbound message was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed invoke request.
    Request(InvokeRequest),
    /// Tagged as a request but not decodable.
    Malformed { id: Option<Value>, message: String },
    /// Some other message; not ours to answer.
    Other,
}

impl Inbound {
    pub fn classify(message: &Value) -> Self {
        if message.get("type").and_then(Value::as_str) != Some(INVOKE_REQUEST) {
            return Self::Other;
        }

        match InvokeRequest::deserialize(message) {
            Ok(request) => Self::Request(request),
            Err(e) => Self::Malformed {
                id: message.get("id").cloned(),
                message: e.to_string(),
            },
        }
    }
}

/// Error details returned to the extension.
///
/// Carries the failed command and a short reason, never host paths or
/// internal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeErrorPayload {
    pub command: String,
    pub code: String,
    pub message: String,
}

/// A reply posted back into the originating surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "INVOKE_RESPONSE")]
    InvokeResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        response: Value,
    },

    #[serde(rename = "INVOKE_ERROR")]
    InvokeError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        error: InvokeErrorPayload,
    },
}

impl OutboundMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::InvokeError { .. })
    }
}
