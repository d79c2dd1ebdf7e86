//! Pending-forwards correlator (§4.8): StreamId -> original-command map
//! for correlating platform responses with the request that triggered them.

use replay_protocol::{Command, Envelope, StreamId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct PendingForwards {
    inner: Mutex<HashMap<StreamId, Envelope<Command>>>,
}

impl PendingForwards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an outbound forward. Happens-before any `resolve` call for
    /// the same streamId within one session (§5 Ordering guarantees).
    pub fn register(&self, cmd: Envelope<Command>) {
        self.inner.lock().unwrap().insert(cmd.stream_id, cmd);
    }

    /// Resolves and removes the pending entry for `stream_id`. Idempotent:
    /// a second resolve of the same streamId returns `None` (§8).
    pub fn resolve(&self, stream_id: StreamId) -> Option<Envelope<Command>> {
        self.inner.lock().unwrap().remove(&stream_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
