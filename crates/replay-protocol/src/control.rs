//! Control channel: session lifecycle, introspection and intercept
//! management commands, each answered by a `ControlResponse` keyed by the
//! client-supplied `requestId` (§3, §4.2, §6).

use crate::ids::InterceptId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an intercept matches a request's `url` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UrlMatch {
    Exact(String),
    Contains(String),
}

impl UrlMatch {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatch::Exact(s) => url == s,
            UrlMatch::Contains(s) => url.contains(s.as_str()),
        }
    }
}

/// The predicate half of an intercept: which requests it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSpec {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_match: Option<UrlMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// A user-registered rule that short-circuits a request with a canned
/// response (§3, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptSpec {
    #[serde(rename = "match")]
    pub match_spec: MatchSpec,
    pub response: crate::payload::ResponsePayload,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

/// A filter over recorded messages used by `GetMessages`/`GetMessageCount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    CreateSession {
        session_id: String,
        mode: SessionMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recording_path: Option<String>,
        /// Playback-mode only (§4.10): also attach a recorder that appends
        /// every replayed command/response, flushed to this path on
        /// `CloseSession`. Enables recording a regression baseline from a
        /// playback run rather than against a live platform.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record_output_path: Option<String>,
    },
    CloseSession {
        session_id: String,
    },
    ListSessions,
    GetStatus {
        session_id: String,
    },
    GetMessages {
        session_id: String,
        #[serde(default)]
        filter: MessageFilter,
    },
    GetMessageCount {
        session_id: String,
        #[serde(default)]
        filter: MessageFilter,
    },
    RegisterIntercept {
        session_id: String,
        spec: InterceptSpec,
    },
    RemoveIntercept {
        session_id: String,
        id: InterceptId,
    },
    ClearIntercepts {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    ListIntercepts {
        session_id: String,
    },
    GetInterceptStats {
        session_id: String,
        id: InterceptId,
    },
}

/// The three operational modes a session may be configured in (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Passthrough,
    Record,
    Playback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEnvelope {
    pub request_id: String,
    pub payload: ControlCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ResponsePayload;
    use serde_json::json;

    #[test]
    fn url_match_exact_and_contains() {
        assert!(UrlMatch::Exact("https://a.com".into()).matches("https://a.com"));
        assert!(!UrlMatch::Exact("https://a.com".into()).matches("https://a.com/x"));
        assert!(UrlMatch::Contains("httpbin".into()).matches("https://httpbin.org/anything"));
        assert!(!UrlMatch::Contains("httpbin".into()).matches("https://example.com"));
    }

    #[test]
    fn intercept_spec_round_trips() {
        let spec = InterceptSpec {
            match_spec: MatchSpec {
                service: "http".into(),
                function_name: None,
                url_match: Some(UrlMatch::Contains("httpbin".into())),
                method: Some("POST".into()),
            },
            response: ResponsePayload {
                service: "http".into(),
                payload: json!({"status": 200, "body": "ok"}),
            },
            priority: 10,
            times: Some(2),
            delay: None,
        };
        let text = serde_json::to_string(&spec).unwrap();
        let back: InterceptSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn control_command_discriminates_on_command_field() {
        let text = r#"{"command":"list_sessions"}"#;
        let cmd: ControlCommand = serde_json::from_str(text).unwrap();
        assert_eq!(cmd, ControlCommand::ListSessions);
    }

    #[test]
    fn control_response_success_and_error_shapes() {
        let ok = ControlResponse::ok("r1", json!({"sessions": []}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = ControlResponse::err("r1", "session not found");
        assert!(!err.success);
        assert!(err.payload.is_none());
    }
}
