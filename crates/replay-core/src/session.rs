//! Session & connection model (§3, §4.11): a session bundles one mode
//! with its recorder, player, pending-forward correlator and intercept
//! registry. `SessionRegistry` is the process-owned container the server
//! creates/looks up sessions through.

use crate::intercept::InterceptRegistry;
use crate::pending_forwards::PendingForwards;
use crate::player::Player;
use crate::recorder::Recorder;
use replay_protocol::SessionMode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-session state. Fields are independently locked/owned rather than
/// behind one coarse session-wide mutex (§5 Scheduling model): the
/// recorder, pending-forwards table, and intercept registry already carry
/// their own interior mutability; the player is swapped in whole when a
/// recording finishes loading.
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub recorder: Option<Recorder>,
    player: Mutex<Option<Arc<Player>>>,
    pub pending_forwards: PendingForwards,
    pub intercepts: InterceptRegistry,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, mode: SessionMode) -> Self {
        let id = id.into();
        let recorder = match mode {
            SessionMode::Record => Some(Recorder::new(id.clone())),
            SessionMode::Passthrough | SessionMode::Playback => None,
        };
        Self {
            id,
            mode,
            recorder,
            player: Mutex::new(None),
            pending_forwards: PendingForwards::new(),
            intercepts: InterceptRegistry::new(),
        }
    }

    /// Builds a record-mode session with a recorder named after the session.
    pub fn new_recording(id: impl Into<String>, scenario_name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            recorder: Some(Recorder::new(scenario_name)),
            mode: SessionMode::Record,
            player: Mutex::new(None),
            pending_forwards: PendingForwards::new(),
            intercepts: InterceptRegistry::new(),
            id,
        }
    }

    pub fn new_playback(id: impl Into<String>, player: Player) -> Self {
        Self {
            id: id.into(),
            mode: SessionMode::Playback,
            recorder: None,
            player: Mutex::new(Some(Arc::new(player))),
            pending_forwards: PendingForwards::new(),
            intercepts: InterceptRegistry::new(),
        }
    }

    /// A playback session that also appends every replayed command/response
    /// to a recorder (§4.10: "enables record while replaying for
    /// regression baselines"). The mode stays `Playback` — it's the
    /// recorder's presence, not the mode, that `handle_command` checks
    /// before appending.
    pub fn new_playback_recording(id: impl Into<String>, player: Player, scenario_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mode: SessionMode::Playback,
            recorder: Some(Recorder::new(scenario_name)),
            player: Mutex::new(Some(Arc::new(player))),
            pending_forwards: PendingForwards::new(),
            intercepts: InterceptRegistry::new(),
        }
    }

    pub fn player(&self) -> Option<Arc<Player>> {
        self.player.lock().unwrap().clone()
    }

    pub fn set_player(&self, player: Player) {
        *self.player.lock().unwrap() = Some(Arc::new(player));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionRegistryError {
    #[error("session {0} already exists")]
    AlreadyExists(String),
    #[error("session {0} not found")]
    NotFound(String),
}

/// Cross-session state, guarded by a single mutex (§5): the registry
/// itself is small and short-held; the heavy per-session work happens
/// inside each `Session`'s own locks.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, session: Session) -> Result<Arc<Session>, SessionRegistryError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id) {
            return Err(SessionRegistryError::AlreadyExists(session.id));
        }
        let id = session.id.clone();
        let session = Arc::new(session);
        sessions.insert(id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Result<Arc<Session>, SessionRegistryError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| SessionRegistryError::NotFound(id.to_owned()))
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
