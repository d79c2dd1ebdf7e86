use futures_util::{SinkExt, StreamExt};
use replay_protocol::{parse_frame, Frame};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let json = frame.to_json()?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Text(text.into().into())).await?;
        Ok(())
    }

    pub async fn recv_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let text = self.recv_text().await?;
        Ok(parse_frame(&text)?)
    }

    /// Reads the next text frame without attempting to parse it as a
    /// `Frame` — useful for asserting on error replies that don't carry
    /// the full envelope shape.
    pub async fn recv_text(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
