//! A mock WebSocket server for integration-testing the harness protocol.
//!
//! Binds to port 0 (random) and exposes the actual bound port. Each test
//! supplies a handler closure that receives the raw text of every inbound
//! frame and returns zero or more raw JSON replies; callers typically
//! build those replies with `replay_protocol::parse_frame`/`Frame::to_json`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;

pub type FrameHandler = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

pub struct MockWsServer {
    addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl MockWsServer {
    /// Starts the mock server, binding to a random available port. Client
    /// connections are handled on a background task, one spawned task per
    /// connection, mirroring how the real harness server multiplexes
    /// sessions over independent connections.
    pub async fn start(handler: FrameHandler) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let task = tokio::spawn(async move {
            Self::accept_loop(listener, handler).await;
        });

        Ok(Self { addr, _task: task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn accept_loop(listener: TcpListener, handler: FrameHandler) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let _ = Self::handle_connection(stream, handler).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        handler: FrameHandler,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg_result) = read.next().await {
            let msg = msg_result?;

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => break,
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                _ => continue,
            };

            for reply in handler(&text) {
                write.send(Message::Text(reply.into())).await?;
            }
        }

        Ok(())
    }
}
