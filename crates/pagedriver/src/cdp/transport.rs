use crate::error::{Error, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for the browser's debugging endpoint.
///
/// Owns the raw socket until `into_parts` splits it into a sender half and
/// a receiver half. The receiver pumps every inbound JSON frame into an
/// unbounded channel; the connection layer consumes that channel and does
/// the response/event routing.
pub struct WebSocketTransport {
    message_tx: mpsc::UnboundedSender<JsonValue>,
    sender: SplitSink<WsStream, WsMessage>,
    receiver: Option<SplitStream<WsStream>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("receiver_present", &self.receiver.is_some())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<JsonValue>)> {
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let parsed = Url::parse(url)
            .map_err(|e| Error::ConnectionFailed(format!("invalid WebSocket URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::ConnectionFailed(format!(
                "expected a ws:// or wss:// URL, got '{url}'"
            )));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("WebSocket handshake failed: {e}")))?;

        let (sender, receiver) = ws_stream.split();

        Ok((
            Self {
                message_tx,
                sender,
                receiver: Some(receiver),
            },
            message_rx,
        ))
    }

    pub fn into_parts(mut self) -> (WebSocketTransportSender, WebSocketTransportReceiver) {
        let receiver = self.receiver.take().expect("Receiver already taken");

        let sender = WebSocketTransportSender {
            sender: self.sender,
        };

        let receiver = WebSocketTransportReceiver {
            receiver,
            message_tx: self.message_tx,
        };

        (sender, receiver)
    }
}

/// Write half of the split transport.
pub struct WebSocketTransportSender {
    sender: SplitSink<WsStream, WsMessage>,
}

impl WebSocketTransportSender {
    pub async fn send(&mut self, message: JsonValue) -> Result<()> {
        let json_str = serde_json::to_string(&message)
            .map_err(|e| Error::Transport(format!("Failed to serialize JSON: {e}")))?;

        self.sender
            .send(WsMessage::Text(json_str.into()))
            .await
            .map_err(|e| Error::Transport(format!("Failed to send WebSocket message: {e}")))
    }

    pub async fn close(&mut self) -> Result<()> {
        let _ = self.sender.send(WsMessage::Close(None)).await;
        self.sender
            .close()
            .await
            .map_err(|e| Error::Transport(format!("Failed to close WebSocket: {e}")))
    }
}

/// Read half of the split transport.
pub struct WebSocketTransportReceiver {
    receiver: SplitStream<WsStream>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl WebSocketTransportReceiver {
    /// Pump inbound frames into the message channel until the socket closes.
    ///
    /// Returns `Ok(())` on an orderly close and `Err` on a socket-level read
    /// failure. Either way the channel's sender is dropped on return, which
    /// the connection layer observes as end-of-stream.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(msg_result) = self.receiver.next().await {
            let msg = msg_result
                .map_err(|e| Error::Transport(format!("WebSocket read error: {e}")))?;

            let text = match msg {
                WsMessage::Text(text) => text.to_string(),
                // Chrome sends JSON as text frames; tolerate UTF-8 binary.
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                WsMessage::Close(_) => break,
                _ => continue,
            };

            let message: JsonValue = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse inbound frame as JSON");
                    continue;
                }
            };

            if self.message_tx.send(message).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_non_ws_scheme() {
        let err = WebSocketTransport::connect("http://127.0.0.1:9222/devtools")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)));
    }
}
