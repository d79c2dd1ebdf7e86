//! Wire-level error taxonomy (§7), tagged on the wire via `ErrorPayload`.

use serde::{Deserialize, Serialize};

/// Frozen error codes, analogous to the `error_codes` module the teacher's
/// own protocol crate defines for its own wire errors.
pub mod error_codes {
    pub const UNEXPECTED_CHANNEL: &str = "UNEXPECTED_CHANNEL";
    pub const UNEXPECTED_COMMAND: &str = "UNEXPECTED_COMMAND";
    pub const NO_PENDING_FORWARD: &str = "NO_PENDING_FORWARD";
    pub const NO_MATCH_FOUND: &str = "NO_MATCH_FOUND";
    pub const ALL_MATCHES_USED: &str = "ALL_MATCHES_USED";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const UNEXPECTED_PAYLOAD: &str = "UNEXPECTED_PAYLOAD";
    pub const UNEXPECTED_CLOSE: &str = "UNEXPECTED_CLOSE";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const SESSION_ALREADY_EXISTS: &str = "SESSION_ALREADY_EXISTS";
    pub const HARNESS_INTERNAL_ERROR: &str = "HARNESS_INTERNAL_ERROR";
}

/// `service="error"` response payload synthesized for per-frame errors
/// that can be correlated back to an originating command (§7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON frame: {0}")]
    MalformedJson(String),
    #[error("frame has no recognizable shape (expected control/command/event envelope)")]
    UnrecognizedShape,
}
