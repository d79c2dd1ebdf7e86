//! The client side of the harness wire contract (§4.12, §6): connect,
//! send a command or control request, and correlate the asynchronous
//! reply — symmetric to `replay-core`'s pending-request table, grounded
//! on `services/receiver/src/session.rs`'s `run_session_loop` shape
//! (a background task generic over `Stream + Sink<Message>` driving a
//! `tokio::select!` read loop with a shutdown signal).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use replay_core::{PendingRequestError, PendingRequestTable};
use replay_protocol::{Command, ControlCommand, ControlEnvelope, ControlResponse, Envelope, Event, Frame};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("decode: {0}")]
    Decode(#[from] replay_protocol::DecodeError),
    #[error("pending request: {0}")]
    Pending(#[from] PendingRequestError),
    #[error("control request {0} received no response before the connection closed")]
    ControlDropped(String),
    #[error("connection closed")]
    ConnectionClosed,
}

type ControlCallback = oneshot::Sender<ControlResponse>;

#[derive(Default)]
struct ControlPendingTable {
    inner: Mutex<HashMap<String, ControlCallback>>,
}

impl ControlPendingTable {
    fn register(&self, request_id: String) -> oneshot::Receiver<ControlResponse> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().insert(request_id, tx);
        rx
    }

    fn resolve(&self, response: ControlResponse) {
        if let Some(tx) = self.inner.lock().unwrap().remove(&response.request_id) {
            let _ = tx.send(response);
        }
    }

    fn cancel_all(&self) {
        for (_, tx) in self.inner.lock().unwrap().drain() {
            drop(tx);
        }
    }
}

/// A connected client: owns the write half and the shared state a
/// background read loop resolves against.
pub struct HarnessClient {
    sink: tokio::sync::Mutex<futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>,
    pending_requests: Arc<PendingRequestTable>,
    pending_control: Arc<ControlPendingTable>,
    events: broadcast::Sender<Envelope<Event>>,
    shutdown_tx: watch::Sender<bool>,
    next_request_id: Mutex<u64>,
}

impl HarnessClient {
    /// Connects to a harness server at `url` (e.g.
    /// `ws://127.0.0.1:9000/?session=my-session`) and spawns the
    /// background read loop that resolves pending commands and control
    /// requests as their replies arrive.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        let (sink, mut stream) = ws.split();

        let pending_requests = Arc::new(PendingRequestTable::new());
        let pending_control = Arc::new(ControlPendingTable::default());
        let (events_tx, _events_rx) = broadcast::channel(256);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let loop_requests = pending_requests.clone();
        let loop_control = pending_control.clone();
        let loop_events = events_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    msg = stream.next() => {
                        match msg {
                            None => break,
                            Some(Err(e)) => {
                                warn!(error = %e, "harness client read error");
                                break;
                            }
                            Some(Ok(Message::Text(text))) => {
                                handle_inbound_text(&text, &loop_requests, &loop_control, &loop_events);
                            }
                            Some(Ok(Message::Close(_))) => break,
                            Some(Ok(_)) => {}
                        }
                    }
                }
            }
            loop_requests.cancel_all(|| PendingRequestError::ConnectionClosed);
            loop_control.cancel_all();
        });

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            pending_requests,
            pending_control,
            events: events_tx,
            shutdown_tx,
            next_request_id: Mutex::new(0),
        })
    }

    /// Sends a command and waits for the matching event (by `streamId`).
    pub async fn send(&self, cmd: Envelope<Command>) -> Result<Envelope<Event>, ClientError> {
        let stream_id = cmd.stream_id;
        let rx = self.pending_requests.register(stream_id);
        self.send_frame(Frame::Command(cmd)).await?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?.map_err(ClientError::from)
    }

    /// Sends a control command, generating a fresh `requestId`, and waits
    /// for the matching `ControlResponse`.
    pub async fn send_control(&self, command: ControlCommand) -> Result<ControlResponse, ClientError> {
        let request_id = {
            let mut next = self.next_request_id.lock().unwrap();
            let id = format!("harness-client-{next}");
            *next += 1;
            id
        };
        let rx = self.pending_control.register(request_id.clone());
        self.send_frame(Frame::Control(ControlEnvelope { request_id: request_id.clone(), payload: command })).await?;
        rx.await.map_err(|_| ClientError::ControlDropped(request_id))
    }

    /// Receives the next event matching `predicate`, ignoring others.
    /// Used by tests waiting on out-of-band events (e.g. `Event::Data`,
    /// or a forwarded event whose streamId is not known ahead of time)
    /// that never pass through `send`'s pending-request correlation.
    pub async fn recv_matching<F>(&self, mut predicate: F) -> Result<Envelope<Event>, ClientError>
    where
        F: FnMut(&Envelope<Event>) -> bool,
    {
        let mut rx = self.events.subscribe();
        loop {
            match rx.recv().await {
                Ok(ev) if predicate(&ev) => return Ok(ev),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::ConnectionClosed),
            }
        }
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), ClientError> {
        let text = frame.to_json()?;
        debug!(%text, "harness client sending frame");
        self.sink.lock().await.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Closes the connection and terminates the background read loop.
    pub async fn close(&self) -> Result<(), ClientError> {
        let _ = self.shutdown_tx.send(true);
        self.sink.lock().await.send(Message::Close(None)).await?;
        Ok(())
    }
}

fn handle_inbound_text(
    text: &str,
    pending_requests: &PendingRequestTable,
    pending_control: &ControlPendingTable,
    events: &broadcast::Sender<Envelope<Event>>,
) {
    match replay_protocol::parse_frame(text) {
        Ok(Frame::Event(ev)) => {
            let _ = events.send(ev.clone());
            if !pending_requests.resolve(ev) {
                debug!("received event with no matching pending request");
            }
        }
        Ok(Frame::Command(_)) => {
            debug!("harness client ignoring unexpected command frame");
        }
        Ok(Frame::Control(_)) => {
            debug!("harness client ignoring control command frame (expected a response)");
        }
        Err(_) => {
            if let Ok(response) = serde_json::from_str::<ControlResponse>(text) {
                pending_control.resolve(response);
            } else {
                warn!(%text, "harness client received an unparseable frame");
            }
        }
    }
}
