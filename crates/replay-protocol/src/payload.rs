//! Command and Event variants (§3), plus the opaque request/response
//! payload shapes carried inside them.
//!
//! Per §9's design note, the opaque `payload` field is kept as a raw
//! `serde_json::Value` rather than decoded into any app-specific shape —
//! the harness only ever looks at four well-known string fields
//! (`service`, `url`, `method`, `functionName`) for interceptor matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{service, payload}` carried by `Command::Open` and recorded requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub service: String,
    pub payload: Value,
}

/// `{service, payload}` carried by `Event::Close` and recorded responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub service: String,
    pub payload: Value,
}

/// A command issued on the `program` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Open {
        #[serde(flatten)]
        request: RequestPayload,
    },
    Close,
}

/// An event issued on the `platform` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Streaming chunk. Per §9 Open Questions: specified but currently
    /// unused by matching logic; kept on the wire for forward compatibility
    /// with streaming services.
    Data { payload: Value },
    Close {
        #[serde(flatten)]
        response: ResponsePayload,
    },
}

impl RequestPayload {
    /// Looks up one of the well-known string fields used for interceptor
    /// matching (`functionName`, `url`, `method`) inside the opaque payload.
    /// Anything else in `payload` is never inspected by the harness.
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}
