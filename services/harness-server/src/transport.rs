//! Transport layer (§4.11, §6): accepts connections on a TCP port or a
//! UNIX domain socket, extracts the `session`/`role` query parameters
//! from the WebSocket upgrade request, and hands each connection off to
//! `dispatch::run_connection`.
//!
//! `tokio_tungstenite::accept_hdr_async` is used directly rather than an
//! HTTP framework: it works identically over any `AsyncRead + AsyncWrite`
//! stream, so the same accept/dispatch code serves both transports.

use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, UnixListener};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{info, warn};

use crate::connections::Role;
use crate::dispatch::run_connection;
use crate::AppState;

#[derive(Debug, Clone, Default)]
struct ConnectionQuery {
    session: Option<String>,
    role: Option<String>,
}

fn capture_query(slot: Arc<Mutex<ConnectionQuery>>) -> impl FnOnce(&Request, Response) -> Result<Response, tokio_tungstenite::tungstenite::handshake::server::ErrorResponse> {
    move |req: &Request, response: Response| {
        let mut query = ConnectionQuery::default();
        if let Some(q) = req.uri().query() {
            for (key, value) in url::form_urlencoded::parse(q.as_bytes()) {
                match key.as_ref() {
                    "session" => query.session = Some(value.into_owned()),
                    "role" => query.role = Some(value.into_owned()),
                    _ => {}
                }
            }
        }
        *slot.lock().unwrap() = query;
        Ok(response)
    }
}

pub async fn serve_tcp(port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "harness server listening on TCP");
    serve_tcp_listener(listener, state).await
}

/// Binds an ephemeral TCP port (`port 0`) and returns its resolved address
/// alongside the accept loop, so tests can dial a real harness-server
/// instance without guessing a free port.
pub async fn serve_tcp_ephemeral(
    state: Arc<AppState>,
) -> std::io::Result<(std::net::SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(serve_tcp_listener(listener, state));
    Ok((addr, handle))
}

async fn serve_tcp_listener(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_and_run(stream, state).await {
                warn!(%peer, error = %e, "connection failed during handshake");
            }
        });
    }
}

pub async fn serve_unix(path: &std::path::Path, state: Arc<AppState>) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "harness server listening on UNIX socket");
    loop {
        let (stream, _addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_and_run(stream, state).await {
                warn!(error = %e, "connection failed during handshake");
            }
        });
    }
}

async fn accept_and_run<S>(stream: S, state: Arc<AppState>) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let slot: Arc<Mutex<ConnectionQuery>> = Arc::new(Mutex::new(ConnectionQuery::default()));
    let ws = tokio_tungstenite::accept_hdr_async(stream, capture_query(slot.clone())).await?;
    let query = slot.lock().unwrap().clone();
    let role = Role::from_query(query.role.as_deref());
    let session_id = query.session;

    if let Some(sid) = &session_id {
        if state.sessions.get(sid).is_none() && sid != "default" {
            warn!(session_id = %sid, "connection attached to a session that does not (yet) exist");
        }
    }

    run_connection(ws, session_id, role, state).await;
    Ok(())
}
