//! Recording file schema (§3, §6): the persisted shape written by the
//! recorder and read back by the (eager or lazy) loader.

use crate::channel::Direction;
use crate::envelope::Envelope;
use crate::payload::{Command, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Current schema version this crate writes. Version 1 remains load-only
/// compatible (§6).
pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const MIN_SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Tagged union so one `Vec<RecordedMessage>` can hold both request and
/// response envelopes without a generic parameter leaking into the file
/// format.
///
/// `#[serde(untagged)]` can't be used here: `Command::Close` is a unit
/// variant, so a recorded `Event::Close` (which carries a flattened
/// `response` field) silently deserializes as a `Command::Close` first,
/// the extra fields just ignored. The envelope's `channel` field isn't a
/// safe discriminator either — an intercepted request's synthesized
/// response is recorded with `channel: program` (it's addressed back to
/// the program side), so a channel-based peek would misread it as a
/// `Command` too. We fall back to the same payload-shape peek `wire`'s
/// module doc already describes: `type: "open"` is always a `Command`,
/// `type: "data"` is always an `Event`, and `type: "close"` is a `Command`
/// only when it carries no flattened response fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordedPayload {
    Command(Envelope<Command>),
    Event(Envelope<Event>),
}

impl<'de> Deserialize<'de> for RecordedPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        struct PayloadKind {
            #[serde(rename = "type")]
            kind: String,
            service: Option<String>,
        }
        #[derive(Deserialize)]
        struct EnvelopePeek {
            payload: PayloadKind,
        }

        let value = serde_json::Value::deserialize(deserializer)?;
        let peek = EnvelopePeek::deserialize(&value).map_err(D::Error::custom)?;
        let is_event = match peek.payload.kind.as_str() {
            "open" => false,
            "data" => true,
            "close" => peek.payload.service.is_some(),
            other => return Err(D::Error::custom(format!("unrecognized payload type {other:?}"))),
        };
        if is_event {
            Envelope::<Event>::deserialize(value).map(RecordedPayload::Event).map_err(D::Error::custom)
        } else {
            Envelope::<Command>::deserialize(value).map(RecordedPayload::Command).map_err(D::Error::custom)
        }
    }
}

impl RecordedPayload {
    pub fn stream_id(&self) -> crate::ids::StreamId {
        match self {
            RecordedPayload::Command(e) => e.stream_id,
            RecordedPayload::Event(e) => e.stream_id,
        }
    }

    pub fn as_command(&self) -> Option<&Envelope<Command>> {
        match self {
            RecordedPayload::Command(e) => Some(e),
            RecordedPayload::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Envelope<Event>> {
        match self {
            RecordedPayload::Event(e) => Some(e),
            RecordedPayload::Command(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedMessage {
    pub envelope: RecordedPayload,
    pub recorded_at: DateTime<Utc>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub schema_version: u32,
    pub scenario_name: String,
    pub recorded_at: DateTime<Utc>,
    pub messages: Vec<RecordedMessage>,
}

/// A raw (still-JSON-text) stand-in for `RecordedMessage`, used by the lazy
/// loader so messages aren't decoded until actually accessed (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecordedMessage(pub Box<RawValue>);

impl RawRecordedMessage {
    /// Decodes the hash field only, without decoding the rest of the
    /// envelope — the cheap shallow parse the chunked indexer relies on
    /// (§4.5).
    pub fn peek_hash(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct HashOnly {
            hash: Option<String>,
        }
        serde_json::from_str::<HashOnly>(self.0.get())
            .ok()
            .and_then(|h| h.hash)
    }

    pub fn decode(&self) -> Result<RecordedMessage, serde_json::Error> {
        serde_json::from_str(self.0.get())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LazyRecording {
    pub schema_version: u32,
    pub scenario_name: String,
    pub recorded_at: DateTime<Utc>,
    pub raw_messages: Vec<RawRecordedMessage>,
}

pub fn validate_schema_version(found: u32) -> Result<(), SchemaError> {
    if (MIN_SUPPORTED_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION).contains(&found) {
        Ok(())
    } else {
        Err(SchemaError {
            found,
            expected: CURRENT_SCHEMA_VERSION,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Incompatible schema: found {found}, expected {expected}")]
pub struct SchemaError {
    pub found: u32,
    pub expected: u32,
}
