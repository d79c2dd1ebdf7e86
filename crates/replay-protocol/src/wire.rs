//! Top-level frame discrimination (§6): a single inbound JSON object is one
//! of `ControlEnvelope`, `Envelope<Command>`, or `Envelope<Event>`.
//!
//! A `ControlEnvelope` never carries a `channel` field at all, so its
//! absence is the first signal. Once a frame is known to be an envelope,
//! §6 specifies discriminating the inner payload on `payload.type`:
//! `"open"` is always a Command, `"data"` is always an Event, and
//! `"close"` is a Command when it carries no inner request/response
//! payload and an Event when it does. Note this can't be done from the
//! envelope's `channel` field alone — an `Event` reply to a program-side
//! request is itself sent back on `channel: "program"` (§4.10), so
//! `channel` does not partition Command from Event the way it might look
//! like it should.

use crate::control::ControlEnvelope;
use crate::envelope::Envelope;
use crate::error::DecodeError;
use crate::payload::{Command, Event};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlEnvelope),
    Command(Envelope<Command>),
    Event(Envelope<Event>),
}

impl Frame {
    /// Serializes back to the single JSON object this frame was parsed
    /// from (or would have been, for a frame built in-process).
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Frame::Control(c) => serde_json::to_string(c),
            Frame::Command(c) => serde_json::to_string(c),
            Frame::Event(e) => serde_json::to_string(e),
        }
    }
}

#[derive(Deserialize)]
struct ChannelPeek {
    channel: Option<String>,
}

#[derive(Deserialize)]
struct PayloadTypePeek {
    #[serde(rename = "type")]
    kind: Option<String>,
    service: Option<String>,
}

#[derive(Deserialize)]
struct EnvelopePeek {
    payload: PayloadTypePeek,
}

/// Parses one inbound JSON frame. A missing `channel` field means the
/// frame is a `ControlEnvelope`; otherwise the inner `payload.type` (and,
/// for the ambiguous `"close"` case, whether a `service` field is present
/// alongside it) picks Command vs Event per §6.
pub fn parse_frame(text: &str) -> Result<Frame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    let peek: ChannelPeek = serde_json::from_value(value.clone())
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    if peek.channel.is_none() {
        let control: ControlEnvelope = serde_json::from_value(value)
            .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
        return Ok(Frame::Control(control));
    }

    let envelope_peek: EnvelopePeek = serde_json::from_value(value.clone())
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;

    match envelope_peek.payload.kind.as_deref() {
        Some("open") => {
            let env: Envelope<Command> = serde_json::from_value(value)
                .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
            Ok(Frame::Command(env))
        }
        Some("data") => {
            let env: Envelope<Event> = serde_json::from_value(value)
                .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
            Ok(Frame::Event(env))
        }
        Some("close") if envelope_peek.payload.service.is_some() => {
            let env: Envelope<Event> = serde_json::from_value(value)
                .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
            Ok(Frame::Event(env))
        }
        Some("close") => {
            let env: Envelope<Command> = serde_json::from_value(value)
                .map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
            Ok(Frame::Command(env))
        }
        _ => Err(DecodeError::UnrecognizedShape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::ids::{StreamId, TraceId};
    use crate::payload::{Event, RequestPayload, ResponsePayload};
    use chrono::Utc;
    use serde_json::json;

    fn command_envelope_json() -> String {
        let env = Envelope {
            stream_id: StreamId::new(),
            trace_id: TraceId::new(),
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: 0,
            timestamp: Utc::now(),
            channel: Channel::Program,
            payload_hash: None,
            payload: Command::Open {
                request: RequestPayload {
                    service: "http".into(),
                    payload: json!({"method": "GET"}),
                },
            },
        };
        serde_json::to_string(&env).unwrap()
    }

    #[test]
    fn program_channel_parses_as_command() {
        let text = command_envelope_json();
        match parse_frame(&text).unwrap() {
            Frame::Command(_) => {}
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn event_reply_on_the_program_channel_still_parses_as_event() {
        // An intercept response or a forwarded platform event is sent
        // back with `channel: "program"` (it's routed to the program
        // side), even though the payload is an Event, not a Command.
        let env = Envelope {
            stream_id: StreamId::new(),
            trace_id: TraceId::new(),
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: 1,
            timestamp: Utc::now(),
            channel: Channel::Program,
            payload_hash: None,
            payload: Event::Close {
                response: ResponsePayload { service: "http".into(), payload: json!({"status": 200}) },
            },
        };
        let text = serde_json::to_string(&env).unwrap();
        match parse_frame(&text).unwrap() {
            Frame::Event(parsed) => assert_eq!(parsed.payload, env.payload),
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn control_envelope_has_no_channel_field_and_parses_as_control() {
        let ce = ControlEnvelope {
            request_id: "r1".into(),
            payload: crate::control::ControlCommand::ListSessions,
        };
        let text = serde_json::to_string(&ce).unwrap();
        match parse_frame(&text).unwrap() {
            Frame::Control(parsed) => assert_eq!(parsed, ce),
            other => panic!("expected Control, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_yields_malformed_json_error() {
        let err = parse_frame("{not-json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedJson(_)));
    }

    #[test]
    fn unrecognized_payload_type_is_rejected() {
        let text = r#"{"channel":"program","payload":{"type":"bogus"}}"#;
        let err = parse_frame(text).unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedShape));
    }
}
