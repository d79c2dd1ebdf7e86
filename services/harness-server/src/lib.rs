//! The harness server: transport loop, session registry wiring, and the
//! per-frame control/command/event dispatch (§4.11).

pub mod connections;
pub mod control;
pub mod dispatch;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use control::RecordingPaths;
use replay_core::SessionRegistry;
use replay_protocol::SessionMode;

use connections::ConnectionRegistry;

pub struct AppState {
    pub sessions: SessionRegistry,
    pub connections: ConnectionRegistry,
    pub recording_paths: RecordingPaths,
    pub base_recording_dir: Option<PathBuf>,
    /// `REPLAY_HASH_NORMALIZE` (§6): whether request hashing strips ambient
    /// envelope fields (`streamId`/`traceId`/`timestamp`) or folds them in.
    pub hash_normalize: bool,
}

impl AppState {
    pub fn new(base_recording_dir: Option<PathBuf>) -> Self {
        Self::with_hash_normalize(base_recording_dir, true)
    }

    pub fn with_hash_normalize(base_recording_dir: Option<PathBuf>, hash_normalize: bool) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            connections: ConnectionRegistry::new(),
            recording_paths: RecordingPaths::new(),
            base_recording_dir,
            hash_normalize,
        }
    }
}

/// Startup configuration, mirroring the CLI surface spec.md §6 names.
pub struct StartupConfig {
    pub mode: Option<SessionMode>,
    pub recording_path: Option<String>,
    pub base_recording_dir: Option<PathBuf>,
}

/// Seeds a `default` session from CLI flags, so a single-session client
/// doesn't need to speak the control protocol at all — it can dial
/// straight in with `?session=default`. Multi-session use still goes
/// through `CreateSession`.
pub async fn bootstrap_default_session(state: &Arc<AppState>, config: &StartupConfig) -> Result<(), String> {
    let Some(mode) = config.mode else { return Ok(()) };

    let ctx = control::ControlContext {
        sessions: &state.sessions,
        connections: &state.connections,
        recording_paths: &state.recording_paths,
        base_recording_dir: config.base_recording_dir.as_deref(),
        hash_normalize: state.hash_normalize,
    };
    control::handle_control(
        &ctx,
        replay_protocol::ControlCommand::CreateSession {
            session_id: "default".to_owned(),
            mode,
            recording_path: config.recording_path.clone(),
            record_output_path: None,
        },
    )
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_no_mode_creates_no_session() {
        let state = Arc::new(AppState::new(None));
        let config = StartupConfig { mode: None, recording_path: None, base_recording_dir: None };
        bootstrap_default_session(&state, &config).await.unwrap();
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_with_passthrough_mode_creates_the_default_session() {
        let state = Arc::new(AppState::new(None));
        let config = StartupConfig { mode: Some(SessionMode::Passthrough), recording_path: None, base_recording_dir: None };
        bootstrap_default_session(&state, &config).await.unwrap();
        let session = state.sessions.get("default").expect("default session created");
        assert_eq!(session.mode, SessionMode::Passthrough);
    }
}
