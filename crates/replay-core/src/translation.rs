//! ID Translation Map (§4.7): per-player bidirectional mapping between
//! recording-time and playback-time StreamIds/TraceIds.

use replay_protocol::{Command, Envelope, Event, StreamId, TraceId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TranslationMap {
    stream_record_to_playback: HashMap<StreamId, StreamId>,
    stream_playback_to_record: HashMap<StreamId, StreamId>,
    trace_record_to_playback: HashMap<TraceId, TraceId>,
    trace_playback_to_record: HashMap<TraceId, TraceId>,
}

impl TranslationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record_stream_id <-> playback_stream_id` and
    /// `record_trace_id <-> playback_trace_id`. Grows monotonically for the
    /// lifetime of the session (§3 Lifecycle).
    pub fn register(
        &mut self,
        record_stream_id: StreamId,
        playback_stream_id: StreamId,
        record_trace_id: TraceId,
        playback_trace_id: TraceId,
    ) {
        self.stream_record_to_playback
            .insert(record_stream_id, playback_stream_id);
        self.stream_playback_to_record
            .insert(playback_stream_id, record_stream_id);
        self.trace_record_to_playback
            .insert(record_trace_id, playback_trace_id);
        self.trace_playback_to_record
            .insert(playback_trace_id, record_trace_id);
    }

    pub fn stream_to_playback(&self, record_id: StreamId) -> Option<StreamId> {
        self.stream_record_to_playback.get(&record_id).copied()
    }

    pub fn stream_to_record(&self, playback_id: StreamId) -> Option<StreamId> {
        self.stream_playback_to_record.get(&playback_id).copied()
    }

    pub fn trace_to_playback(&self, record_id: TraceId) -> Option<TraceId> {
        self.trace_record_to_playback.get(&record_id).copied()
    }

    pub fn trace_to_record(&self, playback_id: TraceId) -> Option<TraceId> {
        self.trace_playback_to_record.get(&playback_id).copied()
    }

    fn translate_stream_field(
        &self,
        field: Option<StreamId>,
        lookup: impl Fn(&Self, StreamId) -> Option<StreamId>,
    ) -> Option<StreamId> {
        field.map(|id| lookup(self, id).unwrap_or(id))
    }

    /// Rewrites `streamId`, `traceId`, `causationStreamId`, `parentStreamId`
    /// from recording-time to playback-time identifiers. Fields unmapped at
    /// translation time pass through unchanged (§4.7).
    pub fn translate_command_to_playback(&self, env: &Envelope<Command>) -> Envelope<Command> {
        let mut out = env.clone();
        out.stream_id = self.stream_to_playback(env.stream_id).unwrap_or(env.stream_id);
        out.trace_id = self.trace_to_playback(env.trace_id).unwrap_or(env.trace_id);
        out.causation_stream_id = self
            .translate_stream_field(env.causation_stream_id, Self::stream_to_playback);
        out.parent_stream_id = self.translate_stream_field(env.parent_stream_id, Self::stream_to_playback);
        out
    }

    pub fn translate_event_to_record(&self, env: &Envelope<Event>) -> Envelope<Event> {
        let mut out = env.clone();
        out.stream_id = self.stream_to_record(env.stream_id).unwrap_or(env.stream_id);
        out.trace_id = self.trace_to_record(env.trace_id).unwrap_or(env.trace_id);
        out.causation_stream_id = self.translate_stream_field(env.causation_stream_id, Self::stream_to_record);
        out.parent_stream_id = self.translate_stream_field(env.parent_stream_id, Self::stream_to_record);
        out
    }

    pub fn translate_event_to_playback(&self, env: &Envelope<Event>) -> Envelope<Event> {
        let mut out = env.clone();
        out.stream_id = self.stream_to_playback(env.stream_id).unwrap_or(env.stream_id);
        out.trace_id = self.trace_to_playback(env.trace_id).unwrap_or(env.trace_id);
        out.causation_stream_id = self.translate_stream_field(env.causation_stream_id, Self::stream_to_playback);
        out.parent_stream_id = self.translate_stream_field(env.parent_stream_id, Self::stream_to_playback);
        out
    }
}
