//! Connection registry: the transport-level counterpart to
//! `replay_core::SessionRegistry`. Each session is served by up to two
//! live WebSocket connections — one playing the "program" role, one
//! playing the "platform" role — distinguished by a `role` query
//! parameter alongside `session` (spec.md §4.11/§6 leave the exact
//! wire-level pairing of a session's two sides unspecified; see
//! DESIGN.md for this resolution). `ForwardToPlatform`/`ForwardToProgram`
//! results from `replay_core::handle_command`/`handle_event` are
//! delivered by looking up the other role's sender here.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Program,
    Platform,
}

impl Role {
    pub fn from_query(value: Option<&str>) -> Role {
        match value {
            Some("platform") => Role::Platform,
            _ => Role::Program,
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<(String, Role), UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, session_id: &str, role: Role, tx: UnboundedSender<String>) {
        self.inner
            .lock()
            .unwrap()
            .insert((session_id.to_owned(), role), tx);
    }

    pub fn detach(&self, session_id: &str, role: Role) {
        self.inner.lock().unwrap().remove(&(session_id.to_owned(), role));
    }

    /// Sends `text` to the other side of `session_id`. Returns `false` if
    /// that side isn't currently connected (dropped silently — per
    /// spec.md §5, no ambient timeout is imposed on pending forwards).
    pub fn send_to(&self, session_id: &str, role: Role, text: String) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.get(&(session_id.to_owned(), role)) {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }
}
