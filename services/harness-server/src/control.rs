//! Control-channel command handling (§3, §4.11): `CreateSession` /
//! `CloseSession` / `ListSessions` / `GetStatus` / `GetMessages` /
//! `GetMessageCount` / intercept management, answered by a
//! `ControlResponse` keyed by the client-supplied `requestId`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use replay_core::{build_hash_index, load_recording_lazy, save_recording, Player, Session, SessionRegistry, SessionRegistryError};
use replay_protocol::{ControlCommand, MessageFilter, RecordedPayload, SessionMode};
use serde_json::{json, Value};

use crate::connections::{ConnectionRegistry, Role};

/// Only these three commands are accepted on a connection that didn't
/// attach with a `?session=` query parameter (spec.md §4.11: "If absent,
/// the connection is in top-level control mode and can only carry
/// CreateSession / ListSessions / CloseSession traffic").
pub fn allowed_at_top_level(cmd: &ControlCommand) -> bool {
    matches!(
        cmd,
        ControlCommand::CreateSession { .. } | ControlCommand::ListSessions | ControlCommand::CloseSession { .. }
    )
}

/// Tracks the on-disk path a record-mode session should be flushed to on
/// close. `replay_core::Session` itself is recording-path agnostic (§3
/// lists `recordingPath` on the session, but the recorder/player only
/// need a concrete path at load/save time, not for the lifetime of the
/// session), so the server keeps this side table instead of growing the
/// core `Session` type with a transport-owned field.
#[derive(Default)]
pub struct RecordingPaths {
    inner: Mutex<HashMap<String, PathBuf>>,
}

impl RecordingPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session_id: &str, path: PathBuf) {
        self.inner.lock().unwrap().insert(session_id.to_owned(), path);
    }

    pub fn take(&self, session_id: &str) -> Option<PathBuf> {
        self.inner.lock().unwrap().remove(session_id)
    }
}

pub struct ControlContext<'a> {
    pub sessions: &'a SessionRegistry,
    pub connections: &'a ConnectionRegistry,
    pub recording_paths: &'a RecordingPaths,
    pub base_recording_dir: Option<&'a Path>,
    /// `REPLAY_HASH_NORMALIZE` (§6), threaded into every `Player` this
    /// context creates so recorded and replayed hashes use the same rule.
    pub hash_normalize: bool,
}

fn resolve_path(ctx: &ControlContext<'_>, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_owned();
    }
    match ctx.base_recording_dir {
        Some(base) => base.join(path),
        None => path.to_owned(),
    }
}

fn message_matches(msg: &replay_protocol::RecordedMessage, filter: &MessageFilter) -> bool {
    if let Some(stream_id) = &filter.stream_id {
        if msg.envelope.stream_id().to_string() != *stream_id {
            return false;
        }
    }
    if let Some(service) = &filter.service {
        let matches_service = match &msg.envelope {
            RecordedPayload::Command(c) => match &c.payload {
                replay_protocol::Command::Open { request } => &request.service == service,
                replay_protocol::Command::Close => false,
            },
            RecordedPayload::Event(e) => match &e.payload {
                replay_protocol::Event::Close { response } => &response.service == service,
                replay_protocol::Event::Data { .. } => false,
            },
        };
        if !matches_service {
            return false;
        }
    }
    true
}

pub async fn handle_control(ctx: &ControlContext<'_>, cmd: ControlCommand) -> Result<Value, String> {
    match cmd {
        ControlCommand::CreateSession { session_id, mode, recording_path, record_output_path } => {
            let session = match mode {
                SessionMode::Passthrough => Session::new(session_id.clone(), mode),
                SessionMode::Record => {
                    let session = Session::new(session_id.clone(), mode);
                    if let Some(raw) = &recording_path {
                        ctx.recording_paths.set(&session_id, resolve_path(ctx, raw));
                    }
                    session
                }
                SessionMode::Playback => {
                    let raw = recording_path
                        .as_ref()
                        .ok_or_else(|| "playback mode requires recordingPath".to_owned())?;
                    let path = resolve_path(ctx, raw);
                    let lazy = load_recording_lazy(&path).await.map_err(|e| e.to_string())?;
                    let index = build_hash_index(&lazy).await;
                    let player = Player::new(lazy, index, ctx.hash_normalize);
                    match &record_output_path {
                        Some(raw) => {
                            ctx.recording_paths.set(&session_id, resolve_path(ctx, raw));
                            Session::new_playback_recording(session_id.clone(), player, session_id.clone())
                        }
                        None => Session::new_playback(session_id.clone(), player),
                    }
                }
            };
            ctx.sessions
                .create(session)
                .map(|s| json!({"sessionId": s.id}))
                .map_err(|e: SessionRegistryError| e.to_string())
        }
        ControlCommand::CloseSession { session_id } => {
            let session = ctx.sessions.remove(&session_id).map_err(|e| e.to_string())?;
            if let Some(recorder) = &session.recorder {
                if let Some(path) = ctx.recording_paths.take(&session_id) {
                    save_recording(&path, &recorder.to_recording())
                        .await
                        .map_err(|e| e.to_string())?;
                }
            }
            ctx.connections.detach(&session_id, Role::Program);
            ctx.connections.detach(&session_id, Role::Platform);
            Ok(json!({"sessionId": session_id}))
        }
        ControlCommand::ListSessions => Ok(json!({"sessions": ctx.sessions.list()})),
        ControlCommand::GetStatus { session_id } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            let message_count = session.recorder.as_ref().map(|r| r.len()).unwrap_or(0);
            Ok(json!({
                "sessionId": session.id,
                "mode": session.mode,
                "messageCount": message_count,
            }))
        }
        ControlCommand::GetMessages { session_id, filter } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            let messages: Vec<_> = match &session.recorder {
                Some(r) => r.snapshot().into_iter().filter(|m| message_matches(m, &filter)).collect(),
                None => Vec::new(),
            };
            Ok(json!({"messages": messages}))
        }
        ControlCommand::GetMessageCount { session_id, filter } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            let count = match &session.recorder {
                Some(r) => r.snapshot().iter().filter(|m| message_matches(m, &filter)).count(),
                None => 0,
            };
            Ok(json!({"count": count}))
        }
        ControlCommand::RegisterIntercept { session_id, spec } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            let id = session.intercepts.register(spec);
            Ok(json!({"interceptId": id}))
        }
        ControlCommand::RemoveIntercept { session_id, id } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            Ok(json!({"removed": session.intercepts.remove(id)}))
        }
        ControlCommand::ClearIntercepts { session_id, service } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            Ok(json!({"cleared": session.intercepts.clear(service.as_deref())}))
        }
        ControlCommand::ListIntercepts { session_id } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            let intercepts: Vec<_> = session
                .intercepts
                .list()
                .into_iter()
                .map(|(id, spec)| json!({"interceptId": id, "spec": spec}))
                .collect();
            Ok(json!({"intercepts": intercepts}))
        }
        ControlCommand::GetInterceptStats { session_id, id } => {
            let session = ctx.sessions.get(&session_id).ok_or_else(|| format!("session {session_id} not found"))?;
            session
                .intercepts
                .stats(id)
                .map(|s| json!({"matchCount": s.match_count, "active": s.active}))
                .ok_or_else(|| format!("intercept {id} not found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_protocol::{InterceptSpec, MatchSpec, ResponsePayload};
    use serde_json::json as j;

    fn ctx<'a>(sessions: &'a SessionRegistry, connections: &'a ConnectionRegistry, paths: &'a RecordingPaths) -> ControlContext<'a> {
        ControlContext { sessions, connections, recording_paths: paths, base_recording_dir: None, hash_normalize: true }
    }

    #[tokio::test]
    async fn create_then_list_then_close_round_trips() {
        let sessions = SessionRegistry::new();
        let connections = ConnectionRegistry::new();
        let paths = RecordingPaths::new();
        let c = ctx(&sessions, &connections, &paths);

        handle_control(&c, ControlCommand::CreateSession {
            session_id: "s1".into(),
            mode: SessionMode::Passthrough,
            recording_path: None,
            record_output_path: None,
        }).await.unwrap();

        let listed = handle_control(&c, ControlCommand::ListSessions).await.unwrap();
        assert_eq!(listed, j!({"sessions": ["s1"]}));

        handle_control(&c, ControlCommand::CloseSession { session_id: "s1".into() }).await.unwrap();
        assert!(sessions.get("s1").is_none());
    }

    #[tokio::test]
    async fn duplicate_create_session_is_an_error() {
        let sessions = SessionRegistry::new();
        let connections = ConnectionRegistry::new();
        let paths = RecordingPaths::new();
        let c = ctx(&sessions, &connections, &paths);

        let cmd = || ControlCommand::CreateSession { session_id: "dup".into(), mode: SessionMode::Passthrough, recording_path: None, record_output_path: None };
        handle_control(&c, cmd()).await.unwrap();
        assert!(handle_control(&c, cmd()).await.is_err());
    }

    #[tokio::test]
    async fn register_and_stat_an_intercept() {
        let sessions = SessionRegistry::new();
        let connections = ConnectionRegistry::new();
        let paths = RecordingPaths::new();
        let c = ctx(&sessions, &connections, &paths);
        handle_control(&c, ControlCommand::CreateSession { session_id: "s1".into(), mode: SessionMode::Passthrough, recording_path: None, record_output_path: None }).await.unwrap();

        let spec = InterceptSpec {
            match_spec: MatchSpec { service: "http".into(), function_name: None, url_match: None, method: None },
            response: ResponsePayload { service: "http".into(), payload: j!({}) },
            priority: 1,
            times: None,
            delay: None,
        };
        let registered = handle_control(&c, ControlCommand::RegisterIntercept { session_id: "s1".into(), spec }).await.unwrap();
        let id: replay_protocol::InterceptId = serde_json::from_value(registered["interceptId"].clone()).unwrap();

        let stats = handle_control(&c, ControlCommand::GetInterceptStats { session_id: "s1".into(), id }).await.unwrap();
        assert_eq!(stats, j!({"matchCount": 0, "active": true}));
    }

    #[tokio::test]
    async fn commands_against_an_unknown_session_are_errors() {
        let sessions = SessionRegistry::new();
        let connections = ConnectionRegistry::new();
        let paths = RecordingPaths::new();
        let c = ctx(&sessions, &connections, &paths);
        let err = handle_control(&c, ControlCommand::GetStatus { session_id: "missing".into() }).await.unwrap_err();
        assert!(err.contains("missing"));
    }

    #[test]
    fn top_level_connections_only_accept_session_lifecycle_commands() {
        assert!(allowed_at_top_level(&ControlCommand::ListSessions));
        assert!(!allowed_at_top_level(&ControlCommand::GetStatus { session_id: "s1".into() }));
    }
}
