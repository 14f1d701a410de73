/*
[INPUT]:  Session URL
[OUTPUT]: An open connection yielding inbound text payloads
[POS]:    WebSocket layer - socket seam between the connection worker and the wire
[UPDATE]: When changing frame handling (ping/pong, binary, close) or TLS setup
*/

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::Result;

/// Opens transports for the connection worker.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One open transport.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound text payload. `None` once the peer has closed the stream.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(err) => {
                        debug!(bytes = bytes.len(), error = %err, "ws binary frame is not utf-8; skipped");
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "ws close frame received");
                    return None;
                }
                // Pongs are queued by tungstenite and flushed on the next read.
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "ws close handshake failed");
        }
    }
}
