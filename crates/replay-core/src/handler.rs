//! Per-frame dispatcher (§4.10): the decision tree that turns one inbound
//! `Envelope<Command>` or `Envelope<Event>` into a `HandleResult`, wiring
//! together the interceptor registry, recorder, player and pending-forward
//! correlator for a single session.

use crate::intercept::InterceptRegistry;
use crate::pending_forwards::PendingForwards;
use crate::player::{PlaybackError, Player};
use crate::recorder::Recorder;
use replay_protocol::{error_codes, Channel, Command, Direction, Envelope, ErrorPayload, Event, RecordedPayload, ResponsePayload, SessionMode, StreamId};

#[derive(Debug, Clone)]
pub enum HandleResult {
    RespondDirectly(Envelope<Event>),
    ForwardToPlatform(Envelope<Command>),
    ForwardToProgram(Envelope<Event>),
    NoResponse,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HandleError {
    #[error("commands are only valid on the program channel, events only on platform")]
    UnexpectedChannel,
    #[error("no pending forward is registered for stream {0}")]
    NoPendingForward(StreamId),
    #[error("no recorded message matches this request")]
    NoMatchFound,
    #[error("all recorded matches for this request have already been consumed")]
    AllMatchesUsed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
    #[error("playback mode requires a loaded recording")]
    NoPlayerConfigured,
}

impl From<PlaybackError> for HandleError {
    fn from(e: PlaybackError) -> Self {
        match e {
            PlaybackError::NoMatchFound => HandleError::NoMatchFound,
            PlaybackError::AllMatchesUsed => HandleError::AllMatchesUsed,
            PlaybackError::InvalidRequest(r) => HandleError::InvalidRequest(r),
            PlaybackError::UnexpectedPayload(r) => HandleError::UnexpectedPayload(r),
        }
    }
}

impl HandleError {
    /// The `error_codes` constant this error maps to on the wire (§7).
    pub fn code(&self) -> &'static str {
        match self {
            HandleError::UnexpectedChannel => error_codes::UNEXPECTED_CHANNEL,
            HandleError::NoPendingForward(_) => error_codes::NO_PENDING_FORWARD,
            HandleError::NoMatchFound => error_codes::NO_MATCH_FOUND,
            HandleError::AllMatchesUsed => error_codes::ALL_MATCHES_USED,
            HandleError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            HandleError::UnexpectedPayload(_) => error_codes::UNEXPECTED_PAYLOAD,
            HandleError::NoPlayerConfigured => error_codes::HARNESS_INTERNAL_ERROR,
        }
    }
}

/// Dispatches a `program`-channel command (§4.10). `pending` is the
/// server-side pending-forwards correlator (§4.8), not the client-side
/// pending-request table.
pub async fn handle_command(
    mode: SessionMode,
    recorder: Option<&Recorder>,
    player: Option<&Player>,
    pending: &PendingForwards,
    intercepts: &InterceptRegistry,
    normalize_hash: bool,
    cmd: Envelope<Command>,
) -> Result<HandleResult, HandleError> {
    if cmd.channel != Channel::Program {
        return Err(HandleError::UnexpectedChannel);
    }

    match &cmd.payload {
        Command::Open { request } => {
            if let Some(intercept_match) = intercepts.match_request(request) {
                if let Some(delay_ms) = intercept_match.spec.delay {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                let response = cmd.reply_with(
                    Channel::Program,
                    1,
                    Event::Close {
                        response: intercept_match.spec.response.clone(),
                    },
                );
                if let Some(rec) = recorder {
                    let hashed_cmd = with_computed_hash(&cmd, request, normalize_hash);
                    rec.append(RecordedPayload::Command(hashed_cmd), Direction::ToHarness, cmd_hash(&cmd, request, normalize_hash));
                    rec.append(RecordedPayload::Event(response.clone()), Direction::FromHarness, None);
                }
                return Ok(HandleResult::RespondDirectly(response));
            }

            match mode {
                SessionMode::Passthrough => {
                    pending.register(cmd.clone());
                    Ok(HandleResult::ForwardToPlatform(with_channel(cmd, Channel::Platform)))
                }
                SessionMode::Record => {
                    if let Some(rec) = recorder {
                        let hashed_cmd = with_computed_hash(&cmd, request, normalize_hash);
                        rec.append(RecordedPayload::Command(hashed_cmd), Direction::ToHarness, cmd_hash(&cmd, request, normalize_hash));
                    }
                    pending.register(cmd.clone());
                    Ok(HandleResult::ForwardToPlatform(with_channel(cmd, Channel::Platform)))
                }
                SessionMode::Playback => {
                    let player = player.ok_or(HandleError::NoPlayerConfigured)?;
                    let response = player.playback_request(&cmd)?;
                    if let Some(rec) = recorder {
                        let hashed_cmd = with_computed_hash(&cmd, request, normalize_hash);
                        rec.append(RecordedPayload::Command(hashed_cmd), Direction::ToHarness, cmd_hash(&cmd, request, normalize_hash));
                        rec.append(RecordedPayload::Event(response.clone()), Direction::FromHarness, None);
                    }
                    Ok(HandleResult::RespondDirectly(response))
                }
            }
        }
        Command::Close => Ok(HandleResult::RespondDirectly(cmd.reply_with(
            Channel::Program,
            1,
            Event::Close {
                response: ResponsePayload {
                    service: "error".into(),
                    payload: serde_json::to_value(ErrorPayload::new(
                        error_codes::UNEXPECTED_CLOSE,
                        "received Close with no matching Open",
                    ))
                    .expect("ErrorPayload always serializes"),
                },
            },
        ))),
    }
}

/// Dispatches a `platform`-channel event (§4.10): resolves the pending
/// forward it correlates with and flips the channel back to `program`.
pub fn handle_event(
    mode: SessionMode,
    recorder: Option<&Recorder>,
    pending: &PendingForwards,
    event: Envelope<Event>,
) -> Result<HandleResult, HandleError> {
    if event.channel != Channel::Platform {
        return Err(HandleError::UnexpectedChannel);
    }

    match pending.resolve(event.stream_id) {
        Some(_original_command) => {
            if mode == SessionMode::Record {
                if let Some(rec) = recorder {
                    rec.append(RecordedPayload::Event(event.clone()), Direction::FromHarness, None);
                }
            }
            Ok(HandleResult::ForwardToProgram(with_channel(event, Channel::Program)))
        }
        None => Err(HandleError::NoPendingForward(event.stream_id)),
    }
}

fn with_channel<P>(mut env: Envelope<P>, channel: Channel) -> Envelope<P> {
    env.channel = channel;
    env
}

fn cmd_hash(cmd: &Envelope<Command>, request: &replay_protocol::RequestPayload, normalize_hash: bool) -> Option<String> {
    let stream_id = cmd.stream_id.to_string();
    let trace_id = cmd.trace_id.to_string();
    let timestamp = cmd.timestamp.to_rfc3339();
    Some(replay_protocol::hash_or_reuse_request(
        cmd.payload_hash.as_deref(),
        &serde_json::to_value(request).expect("RequestPayload always serializes"),
        normalize_hash,
        replay_protocol::AmbientFields { stream_id: &stream_id, trace_id: &trace_id, timestamp: &timestamp },
    ))
}

fn with_computed_hash(cmd: &Envelope<Command>, request: &replay_protocol::RequestPayload, normalize_hash: bool) -> Envelope<Command> {
    let mut out = cmd.clone();
    out.payload_hash = cmd_hash(cmd, request, normalize_hash);
    out
}
