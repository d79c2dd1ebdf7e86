//! Contract round-trip tests: build one example of each wire shape (§6),
//! serialize it, parse it back through `parse_frame`, and check the
//! envelope and payload fields survive unchanged.

use chrono::Utc;
use replay_protocol::{
    parse_frame, Channel, Command, ControlCommand, ControlEnvelope, ControlResponse, Envelope,
    Event, Frame, RequestPayload, ResponsePayload, SessionMode, StreamId, TraceId,
};
use serde_json::json;

fn sample_envelope<P>(channel: Channel, payload: P) -> Envelope<P> {
    Envelope {
        stream_id: StreamId::new(),
        trace_id: TraceId::new(),
        causation_stream_id: None,
        parent_stream_id: None,
        sibling_index: 0,
        event_seq: 0,
        timestamp: Utc::now(),
        channel,
        payload_hash: None,
        payload,
    }
}

#[test]
fn open_command_round_trips_through_the_wire() {
    let env = sample_envelope(
        Channel::Program,
        Command::Open {
            request: RequestPayload {
                service: "http".into(),
                payload: json!({"method": "GET", "url": "https://example.com"}),
            },
        },
    );
    let text = serde_json::to_string(&env).unwrap();
    match parse_frame(&text).unwrap() {
        Frame::Command(parsed) => {
            assert_eq!(parsed.stream_id, env.stream_id);
            assert_eq!(parsed.payload, env.payload);
        }
        other => panic!("expected Command, got {other:?}"),
    }
}

#[test]
fn close_command_round_trips_with_no_inner_payload() {
    let env = sample_envelope(Channel::Program, Command::Close);
    let text = serde_json::to_string(&env).unwrap();
    match parse_frame(&text).unwrap() {
        Frame::Command(parsed) => assert_eq!(parsed.payload, Command::Close),
        other => panic!("expected Command, got {other:?}"),
    }
}

#[test]
fn data_event_round_trips_on_the_platform_channel() {
    let env = sample_envelope(Channel::Platform, Event::Data { payload: json!({"chunk": 1}) });
    let text = serde_json::to_string(&env).unwrap();
    match parse_frame(&text).unwrap() {
        Frame::Event(parsed) => assert_eq!(parsed.payload, env.payload),
        other => panic!("expected Event, got {other:?}"),
    }
}

#[test]
fn close_event_round_trips_on_the_program_channel() {
    // A response routed back to the requester carries the `program`
    // channel even though the payload is an Event (§4.10) — the two
    // shapes are disambiguated by `payload.type` plus the presence of a
    // `service` field, not by `channel` alone.
    let env = sample_envelope(
        Channel::Program,
        Event::Close {
            response: ResponsePayload { service: "http".into(), payload: json!({"status": 200}) },
        },
    );
    let text = serde_json::to_string(&env).unwrap();
    match parse_frame(&text).unwrap() {
        Frame::Event(parsed) => assert_eq!(parsed.payload, env.payload),
        other => panic!("expected Event, got {other:?}"),
    }
}

#[test]
fn control_envelope_round_trips_with_camel_case_request_id() {
    let envelope = ControlEnvelope {
        request_id: "req-1".into(),
        payload: ControlCommand::CreateSession {
            session_id: "s1".into(),
            mode: SessionMode::Record,
            recording_path: Some("/tmp/rec.json".into()),
            record_output_path: None,
        },
    };
    let text = serde_json::to_string(&envelope).unwrap();
    assert!(text.contains("\"requestId\":\"req-1\""), "wire field must be camelCase: {text}");

    match parse_frame(&text).unwrap() {
        Frame::Control(parsed) => assert_eq!(parsed, envelope),
        other => panic!("expected Control, got {other:?}"),
    }
}

#[test]
fn control_response_round_trips_with_camel_case_request_id() {
    let response = ControlResponse::ok("req-2", json!({"sessions": ["a", "b"]}));
    let text = serde_json::to_string(&response).unwrap();
    assert!(text.contains("\"requestId\":\"req-2\""), "wire field must be camelCase: {text}");

    let back: ControlResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(back, response);
}
