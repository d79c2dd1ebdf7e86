//! Envelope: the universal routing and identity wrapper (§3) around every
//! Command/Event payload.

use crate::channel::Channel;
use crate::ids::{StreamId, TraceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P> {
    pub stream_id: StreamId,
    pub trace_id: TraceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_stream_id: Option<StreamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_stream_id: Option<StreamId>,
    pub sibling_index: u32,
    /// 0 for opens, 1 for closes.
    pub event_seq: u8,
    pub timestamp: DateTime<Utc>,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Builds a response envelope that reuses this envelope's routing
    /// fields but swaps in a new payload, channel and event_seq — the
    /// shape every "respond in place" code path needs (intercepts,
    /// playback, synthesized errors; §4.6 step 6, §4.10).
    pub fn reply_with<Q>(&self, channel: Channel, event_seq: u8, payload: Q) -> Envelope<Q> {
        Envelope {
            stream_id: self.stream_id,
            trace_id: self.trace_id,
            causation_stream_id: self.causation_stream_id,
            parent_stream_id: self.parent_stream_id,
            sibling_index: self.sibling_index,
            event_seq,
            timestamp: Utc::now(),
            channel,
            payload_hash: None,
            payload,
        }
    }

    pub fn with_payload<Q>(&self, payload: Q) -> Envelope<Q> {
        Envelope {
            stream_id: self.stream_id,
            trace_id: self.trace_id,
            causation_stream_id: self.causation_stream_id,
            parent_stream_id: self.parent_stream_id,
            sibling_index: self.sibling_index,
            event_seq: self.event_seq,
            timestamp: self.timestamp,
            channel: self.channel,
            payload_hash: self.payload_hash.clone(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Command, RequestPayload};
    use serde_json::json;

    fn sample_envelope() -> Envelope<Command> {
        Envelope {
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
                    service: "http".to_owned(),
                    payload: json!({"method": "GET"}),
                },
            },
        }
    }

    #[test]
    fn round_trips_through_json() {
        let env = sample_envelope();
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope<Command> = serde_json::from_str(&text).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn reply_with_preserves_routing_fields_but_swaps_channel_and_event_seq() {
        let env = sample_envelope();
        let reply = env.reply_with(Channel::Platform, 1, Command::Close);
        assert_eq!(reply.stream_id, env.stream_id);
        assert_eq!(reply.trace_id, env.trace_id);
        assert_eq!(reply.sibling_index, env.sibling_index);
        assert_eq!(reply.channel, Channel::Platform);
        assert_eq!(reply.event_seq, 1);
    }

    #[test]
    fn optional_routing_fields_are_omitted_from_json_when_absent() {
        let env = sample_envelope();
        let text = serde_json::to_string(&env).unwrap();
        assert!(!text.contains("causationStreamId"));
        assert!(!text.contains("parentStreamId"));
    }
}
