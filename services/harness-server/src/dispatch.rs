//! Per-connection frame loop (§4.11): parses each inbound JSON frame,
//! dispatches it through `replay_core`, and writes outbound frames either
//! back to the originating connection or across to the session's other
//! role via the `ConnectionRegistry`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use replay_core::{handle_command, handle_event, HandleError, HandleResult};
use replay_protocol::{parse_frame, Channel, Command, ErrorPayload, Event, Frame, ResponsePayload};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::connections::Role;
use crate::control::{allowed_at_top_level, handle_control, ControlContext};
use crate::AppState;

fn error_event_for_command(
    cmd: &replay_protocol::Envelope<Command>,
    err: &HandleError,
) -> replay_protocol::Envelope<Event> {
    cmd.reply_with(
        Channel::Program,
        1,
        Event::Close {
            response: ResponsePayload {
                service: "error".into(),
                payload: serde_json::to_value(ErrorPayload::new(err.code(), err.to_string()))
                    .expect("ErrorPayload always serializes"),
            },
        },
    )
}

fn error_event_for_event(
    ev: &replay_protocol::Envelope<Event>,
    err: &HandleError,
) -> replay_protocol::Envelope<Event> {
    ev.reply_with(
        ev.channel,
        1,
        Event::Close {
            response: ResponsePayload {
                service: "error".into(),
                payload: serde_json::to_value(ErrorPayload::new(err.code(), err.to_string()))
                    .expect("ErrorPayload always serializes"),
            },
        },
    )
}

/// Runs one accepted WebSocket connection to completion. `session_id` is
/// `None` for a top-level control-mode connection (spec.md §4.11).
pub async fn run_connection<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    session_id: Option<String>,
    role: Role,
    state: Arc<AppState>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx): (UnboundedSender<String>, _) = mpsc::unbounded_channel();

    if let Some(sid) = &session_id {
        state.connections.attach(sid, role, tx.clone());
        info!(session_id = %sid, ?role, "connection attached");
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "websocket read error");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };

        match parse_frame(&text) {
            Err(e) => {
                debug!(error = %e, "malformed frame");
                let _ = tx.send(format!(r#"{{"error":"{e}"}}"#));
            }
            Ok(Frame::Control(envelope)) => {
                let top_level = session_id.is_none();
                if top_level && !allowed_at_top_level(&envelope.payload) {
                    let resp = replay_protocol::ControlResponse::err(
                        envelope.request_id,
                        "this command requires an attached session (?session=...)",
                    );
                    let _ = tx.send(serde_json::to_string(&resp).expect("ControlResponse always serializes"));
                    continue;
                }
                let ctx = ControlContext {
                    sessions: &state.sessions,
                    connections: &state.connections,
                    recording_paths: &state.recording_paths,
                    base_recording_dir: state.base_recording_dir.as_deref(),
                    hash_normalize: state.hash_normalize,
                };
                let resp = match handle_control(&ctx, envelope.payload).await {
                    Ok(payload) => replay_protocol::ControlResponse::ok(envelope.request_id, payload),
                    Err(err) => replay_protocol::ControlResponse::err(envelope.request_id, err),
                };
                let _ = tx.send(serde_json::to_string(&resp).expect("ControlResponse always serializes"));
            }
            Ok(Frame::Command(cmd)) => {
                let Some(sid) = &session_id else {
                    let _ = tx.send(r#"{"error":"command frames require an attached session"}"#.to_owned());
                    continue;
                };
                let Some(session) = state.sessions.get(sid) else {
                    let _ = tx.send(format!(r#"{{"error":"session {sid} not found"}}"#));
                    continue;
                };
                let player = session.player();
                let result = handle_command(
                    session.mode,
                    session.recorder.as_ref(),
                    player.as_deref(),
                    &session.pending_forwards,
                    &session.intercepts,
                    state.hash_normalize,
                    cmd.clone(),
                )
                .await;
                match result {
                    Ok(HandleResult::RespondDirectly(ev)) => {
                        let _ = tx.send(Frame::Event(ev).to_json().expect("Frame serializes"));
                    }
                    Ok(HandleResult::ForwardToPlatform(fwd)) => {
                        let text = Frame::Command(fwd).to_json().expect("Frame serializes");
                        if !state.connections.send_to(sid, Role::Platform, text) {
                            warn!(session_id = %sid, "no platform connection attached; forward dropped");
                        }
                    }
                    Ok(HandleResult::ForwardToProgram(_) | HandleResult::NoResponse) => {}
                    Err(err) => {
                        let _ = tx.send(Frame::Event(error_event_for_command(&cmd, &err)).to_json().expect("Frame serializes"));
                    }
                }
            }
            Ok(Frame::Event(ev)) => {
                let Some(sid) = &session_id else {
                    let _ = tx.send(r#"{"error":"event frames require an attached session"}"#.to_owned());
                    continue;
                };
                let Some(session) = state.sessions.get(sid) else {
                    let _ = tx.send(format!(r#"{{"error":"session {sid} not found"}}"#));
                    continue;
                };
                let result = handle_event(session.mode, session.recorder.as_ref(), &session.pending_forwards, ev.clone());
                match result {
                    Ok(HandleResult::ForwardToProgram(fwd)) => {
                        let text = Frame::Event(fwd).to_json().expect("Frame serializes");
                        if !state.connections.send_to(sid, Role::Program, text) {
                            warn!(session_id = %sid, "no program connection attached; forward dropped");
                        }
                    }
                    Ok(HandleResult::RespondDirectly(_) | HandleResult::ForwardToPlatform(_) | HandleResult::NoResponse) => {}
                    Err(err) => {
                        let _ = tx.send(Frame::Event(error_event_for_event(&ev, &err)).to_json().expect("Frame serializes"));
                    }
                }
            }
        }
    }

    if let Some(sid) = &session_id {
        state.connections.detach(sid, role);
        info!(session_id = %sid, ?role, "connection detached");
    }
    writer.abort();
}
