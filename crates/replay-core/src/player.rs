//! Player (§4.6): matches inbound commands against a recording by
//! canonical payload hash, at-most-once, translating IDs between
//! recording-time and playback-time.

use crate::indexer::HashIndex;
use crate::translation::TranslationMap;
use replay_protocol::{Command, Direction, Envelope, Event, LazyRecording, RecordedMessage, RecordedPayload};
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error("no recorded message matches this request's payload hash")]
    NoMatchFound,
    #[error("all recorded matches for this payload hash have already been consumed")]
    AllMatchesUsed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
}

pub struct Player {
    recording: LazyRecording,
    index: HashIndex,
    used: Mutex<HashSet<usize>>,
    translation: Mutex<TranslationMap>,
    normalize_hash: bool,
}

impl Player {
    pub fn new(recording: LazyRecording, index: HashIndex, normalize_hash: bool) -> Self {
        Self {
            recording,
            index,
            used: Mutex::new(HashSet::new()),
            translation: Mutex::new(TranslationMap::new()),
            normalize_hash,
        }
    }

    fn decode_at(&self, idx: usize) -> Result<RecordedMessage, PlaybackError> {
        self.recording
            .raw_messages
            .get(idx)
            .ok_or_else(|| PlaybackError::InvalidRequest(format!("index {idx} out of range")))?
            .decode()
            .map_err(|e| PlaybackError::InvalidRequest(format!("corrupt recorded message at index {idx}: {e}")))
    }

    /// Returns the lowest-indexed unused recorded message whose payload
    /// hash is `hash`, decoding only that one message. Falls back to a
    /// linear scan (recomputing each open command's hash) when `hash`
    /// isn't present in the index at all — e.g. the recorded message
    /// predates hash persistence.
    pub fn find_match(&self, hash: &str) -> Result<(usize, RecordedMessage), PlaybackError> {
        {
            let used = self.used.lock().unwrap();
            if let Some(idx) = self.index.lowest_unused(hash, &used) {
                drop(used);
                return Ok((idx, self.decode_at(idx)?));
            }
            if !self.index.indices_for(hash).is_empty() {
                return Err(PlaybackError::AllMatchesUsed);
            }
        }

        let used = self.used.lock().unwrap();
        for (idx, raw) in self.recording.raw_messages.iter().enumerate() {
            if used.contains(&idx) {
                continue;
            }
            let Ok(msg) = raw.decode() else { continue };
            if let Some(cmd_env) = msg.envelope.as_command() {
                if let Command::Open { request } = &cmd_env.payload {
                    let value = serde_json::to_value(request).expect("RequestPayload always serializes");
                    let candidate = replay_protocol::hash_request(
                        &value,
                        self.normalize_hash,
                        replay_protocol::AmbientFields {
                            stream_id: &cmd_env.stream_id.to_string(),
                            trace_id: &cmd_env.trace_id.to_string(),
                            timestamp: &cmd_env.timestamp.to_rfc3339(),
                        },
                    );
                    if candidate == hash {
                        return Ok((idx, msg));
                    }
                }
            }
        }
        Err(PlaybackError::NoMatchFound)
    }

    /// Synthesizes a response event for `cmd` from the recording (§4.6).
    pub fn playback_request(&self, cmd: &Envelope<Command>) -> Result<Envelope<Event>, PlaybackError> {
        let request = match &cmd.payload {
            Command::Open { request } => request,
            Command::Close => {
                return Err(PlaybackError::UnexpectedPayload(
                    "playback only matches Command::Open requests".into(),
                ))
            }
        };

        let hash = cmd.payload_hash.clone().unwrap_or_else(|| {
            let value = serde_json::to_value(request).expect("RequestPayload always serializes");
            replay_protocol::hash_request(
                &value,
                self.normalize_hash,
                replay_protocol::AmbientFields {
                    stream_id: &cmd.stream_id.to_string(),
                    trace_id: &cmd.trace_id.to_string(),
                    timestamp: &cmd.timestamp.to_rfc3339(),
                },
            )
        });

        let (match_index, matched) = self.find_match(&hash)?;
        self.used.lock().unwrap().insert(match_index);

        let recorded_stream_id = matched.envelope.stream_id();
        let recorded_trace_id = match &matched.envelope {
            RecordedPayload::Command(e) => e.trace_id,
            RecordedPayload::Event(e) => e.trace_id,
        };
        self.translation.lock().unwrap().register(
            recorded_stream_id,
            cmd.stream_id,
            recorded_trace_id,
            cmd.trace_id,
        );

        for idx in (match_index + 1)..self.recording.raw_messages.len() {
            let msg = self.decode_at(idx)?;
            if msg.direction != Direction::FromHarness || msg.envelope.stream_id() != recorded_stream_id {
                continue;
            }
            let response_env = msg
                .envelope
                .as_event()
                .ok_or_else(|| PlaybackError::UnexpectedPayload("recorded response is not an event".into()))?;

            let mut synthesized = cmd.with_payload(response_env.payload.clone());
            synthesized.event_seq = response_env.event_seq;
            synthesized.timestamp = response_env.timestamp;
            synthesized.payload_hash = None;
            return Ok(synthesized);
        }

        Err(PlaybackError::InvalidRequest("No corresponding response".into()))
    }

    pub fn used_count(&self) -> usize {
        self.used.lock().unwrap().len()
    }

    pub fn translation(&self) -> std::sync::MutexGuard<'_, TranslationMap> {
        self.translation.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use replay_protocol::{Channel, RequestPayload, ResponsePayload, StreamId, TraceId};
    use serde_json::{json, value::RawValue};

    fn raw(msg: &RecordedMessage) -> replay_protocol::RawRecordedMessage {
        replay_protocol::RawRecordedMessage(RawValue::from_string(serde_json::to_string(msg).unwrap()).unwrap())
    }

    fn command_message(stream_id: StreamId, body: &str) -> RecordedMessage {
        let hash = replay_protocol::hash_value(&json!({"service": "http", "payload": {"body": body}}));
        RecordedMessage {
            envelope: RecordedPayload::Command(Envelope {
                stream_id,
                trace_id: TraceId::new(),
                causation_stream_id: None,
                parent_stream_id: None,
                sibling_index: 0,
                event_seq: 0,
                timestamp: Utc::now(),
                channel: Channel::Program,
                payload_hash: Some(hash.clone()),
                payload: Command::Open {
                    request: RequestPayload {
                        service: "http".into(),
                        payload: json!({"body": body}),
                    },
                },
            }),
            recorded_at: Utc::now(),
            direction: Direction::ToHarness,
            hash: Some(hash),
        }
    }

    fn response_message(stream_id: StreamId, body: &str) -> RecordedMessage {
        RecordedMessage {
            envelope: RecordedPayload::Event(Envelope {
                stream_id,
                trace_id: TraceId::new(),
                causation_stream_id: None,
                parent_stream_id: None,
                sibling_index: 0,
                event_seq: 1,
                timestamp: Utc::now(),
                channel: Channel::Platform,
                payload_hash: None,
                payload: Event::Close {
                    response: ResponsePayload {
                        service: "http".into(),
                        payload: json!({"body": body}),
                    },
                },
            }),
            recorded_at: Utc::now(),
            direction: Direction::FromHarness,
            hash: None,
        }
    }

    fn live_command(hash: &str) -> Envelope<Command> {
        Envelope {
            stream_id: StreamId::new(),
            trace_id: TraceId::new(),
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: 0,
            timestamp: Utc::now(),
            channel: Channel::Program,
            payload_hash: Some(hash.to_owned()),
            payload: Command::Open {
                request: RequestPayload {
                    service: "http".into(),
                    payload: json!({"body": "whatever"}),
                },
            },
        }
    }

    async fn player_for(messages: Vec<RecordedMessage>) -> Player {
        let recording = LazyRecording {
            schema_version: replay_protocol::CURRENT_SCHEMA_VERSION,
            scenario_name: "scenario".into(),
            recorded_at: Utc::now(),
            raw_messages: messages.iter().map(raw).collect(),
        };
        let index = crate::indexer::build_hash_index(&recording).await;
        Player::new(recording, index, true)
    }

    #[tokio::test]
    async fn same_hash_ordering_returns_responses_in_recorded_order_then_no_match() {
        let hash = replay_protocol::hash_value(&json!({"service": "http", "payload": {"body": "same"}}));
        let s0 = StreamId::new();
        let s1 = StreamId::new();
        let s2 = StreamId::new();
        let player = player_for(vec![
            command_message(s0, "same"),
            response_message(s0, "first"),
            command_message(s1, "same"),
            response_message(s1, "second"),
            command_message(s2, "same"),
            response_message(s2, "third"),
        ])
        .await;

        let first = player.playback_request(&live_command(&hash)).unwrap();
        assert_eq!(first.payload, Event::Close { response: ResponsePayload { service: "http".into(), payload: json!({"body": "first"}) } });

        let second = player.playback_request(&live_command(&hash)).unwrap();
        assert_eq!(second.payload, Event::Close { response: ResponsePayload { service: "http".into(), payload: json!({"body": "second"}) } });

        let third = player.playback_request(&live_command(&hash)).unwrap();
        assert_eq!(third.payload, Event::Close { response: ResponsePayload { service: "http".into(), payload: json!({"body": "third"}) } });

        let err = player.playback_request(&live_command(&hash)).unwrap_err();
        assert!(matches!(err, PlaybackError::AllMatchesUsed));
    }

    #[tokio::test]
    async fn unknown_hash_returns_no_match_found() {
        let player = player_for(vec![]).await;
        let err = player.playback_request(&live_command(&"0".repeat(64))).unwrap_err();
        assert!(matches!(err, PlaybackError::NoMatchFound));
    }

    #[tokio::test]
    async fn playback_response_carries_live_routing_fields_not_recorded_ones() {
        let hash = replay_protocol::hash_value(&json!({"service": "http", "payload": {"body": "x"}}));
        let s0 = StreamId::new();
        let player = player_for(vec![command_message(s0, "x"), response_message(s0, "x")]).await;

        let live = live_command(&hash);
        let result = player.playback_request(&live).unwrap();
        assert_eq!(result.stream_id, live.stream_id);
        assert_eq!(result.trace_id, live.trace_id);
        assert_ne!(result.stream_id, s0);
    }

    #[tokio::test]
    async fn missing_corresponding_response_is_invalid_request() {
        let hash = replay_protocol::hash_value(&json!({"service": "http", "payload": {"body": "orphan"}}));
        let s0 = StreamId::new();
        let player = player_for(vec![command_message(s0, "orphan")]).await;
        let err = player.playback_request(&live_command(&hash)).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unnormalized_hashing_requires_the_live_command_to_supply_a_matching_payload_hash() {
        let s0 = StreamId::new();
        let messages = [command_message(s0, "x"), response_message(s0, "x")];
        let recording = LazyRecording {
            schema_version: replay_protocol::CURRENT_SCHEMA_VERSION,
            scenario_name: "scenario".into(),
            recorded_at: Utc::now(),
            raw_messages: messages.iter().map(raw).collect(),
        };
        let index = crate::indexer::build_hash_index(&recording).await;
        let player = Player::new(recording, index, false);

        // The recorded hash was computed (normalized) over just the request;
        // a live command that omits `payloadHash` and relies on this
        // player's own (unnormalized) computation folds in its own fresh
        // streamId, which never matches the recorded one.
        let hash = replay_protocol::hash_value(&json!({"service": "http", "payload": {"body": "x"}}));
        let mut live = live_command(&hash);
        live.payload_hash = None;
        let err = player.playback_request(&live).unwrap_err();
        assert!(matches!(err, PlaybackError::NoMatchFound));
    }
}
