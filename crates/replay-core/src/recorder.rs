//! Recorder (§4.3): an in-memory, append-only message log. Save-on-close
//! is the only durability point.

use chrono::Utc;
use replay_protocol::{Direction, RecordedMessage, RecordedPayload, Recording};
use std::sync::Mutex;

pub struct Recorder {
    scenario_name: String,
    started_at: chrono::DateTime<Utc>,
    messages: Mutex<Vec<RecordedMessage>>,
}

impl Recorder {
    pub fn new(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            started_at: Utc::now(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Appends a message. O(1), never reorders, never mutated afterward —
    /// the player only ever reads this log, it never writes to it (§5
    /// Shared-resource policy).
    pub fn append(&self, envelope: RecordedPayload, direction: Direction, hash: Option<String>) {
        self.messages.lock().unwrap().push(RecordedMessage {
            envelope,
            recorded_at: Utc::now(),
            direction,
            hash,
        });
    }

    /// A stable-length snapshot for concurrent readers (control queries),
    /// per §5 Shared-resource policy.
    pub fn snapshot(&self) -> Vec<RecordedMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the full persisted `Recording` at the session's current
    /// schema version.
    pub fn to_recording(&self) -> Recording {
        Recording {
            schema_version: replay_protocol::CURRENT_SCHEMA_VERSION,
            scenario_name: self.scenario_name.clone(),
            recorded_at: self.started_at,
            messages: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use replay_protocol::{Channel, Command, Envelope, RequestPayload, StreamId, TraceId};
    use serde_json::json;

    fn open_command() -> RecordedPayload {
        RecordedPayload::Command(Envelope {
            stream_id: StreamId::new(),
            trace_id: TraceId::new(),
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: 0,
            timestamp: ChronoUtc::now(),
            channel: Channel::Program,
            payload_hash: None,
            payload: Command::Open {
                request: RequestPayload {
                    service: "http".into(),
                    payload: json!({}),
                },
            },
        })
    }

    #[test]
    fn append_preserves_order_and_never_reorders() {
        let rec = Recorder::new("scenario-a");
        for _ in 0..5 {
            rec.append(open_command(), Direction::ToHarness, None);
        }
        assert_eq!(rec.len(), 5);
        let snap = rec.snapshot();
        assert_eq!(snap.len(), 5);
    }

    #[test]
    fn to_recording_carries_current_schema_version_and_scenario_name() {
        let rec = Recorder::new("scenario-a");
        rec.append(open_command(), Direction::ToHarness, Some("abc".into()));
        let recording = rec.to_recording();
        assert_eq!(recording.schema_version, replay_protocol::CURRENT_SCHEMA_VERSION);
        assert_eq!(recording.scenario_name, "scenario-a");
        assert_eq!(recording.messages.len(), 1);
    }
}
