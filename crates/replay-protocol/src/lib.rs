//! replay-protocol: envelope framing, canonical hashing, and wire types for
//! the record/replay harness.
//!
//! All wire messages use either the `ControlEnvelope` shape (control
//! channel) or the generic `Envelope<P>` shape tagged by `channel`. See
//! [`wire::parse_frame`] for top-level discrimination.

pub mod channel;
pub mod control;
pub mod envelope;
pub mod error;
pub mod hash;
pub mod ids;
pub mod payload;
pub mod recording;
pub mod wire;

pub use channel::{Channel, Direction};
pub use control::{
    ControlCommand, ControlEnvelope, ControlResponse, InterceptSpec, MatchSpec, MessageFilter,
    SessionMode, UrlMatch,
};
pub use envelope::Envelope;
pub use error::{error_codes, DecodeError, ErrorPayload};
pub use hash::{canonicalize, hash_or_reuse, hash_or_reuse_request, hash_request, hash_value, AmbientFields};
pub use ids::{InterceptId, StreamId, TraceId};
pub use payload::{Command, Event, RequestPayload, ResponsePayload};
pub use recording::{
    validate_schema_version, LazyRecording, RawRecordedMessage, RecordedMessage, RecordedPayload,
    Recording, SchemaError, CURRENT_SCHEMA_VERSION, MIN_SUPPORTED_SCHEMA_VERSION,
};
pub use wire::{parse_frame, Frame};
