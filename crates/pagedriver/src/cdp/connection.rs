//! Command/response correlation and event fan-out over one debugging connection.
//!
//! The connection knows nothing about pages: it speaks method names, parameter
//! payloads, and opaque session identifiers. Commands are sent with
//! auto-incrementing ids and responses are correlated back to the caller by id,
//! not send order — the browser is free to answer out of order. Frames without
//! an id are events and fan out to every subscriber registered for their
//! method name.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as ParkingLotMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot};

use crate::cdp::transport::{WebSocketTransport, WebSocketTransportSender};
use crate::error::{Error, Result};

/// Outbound command frame: `{"id", "method", "params", "sessionId"?}`.
#[derive(Debug, Clone, Serialize)]
struct CommandFrame<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// Inbound response frame: `{"id", "result"?, "error"?}`.
#[derive(Debug, Clone, Deserialize)]
struct ResponseFrame {
    id: u64,
    result: Option<Value>,
    error: Option<CdpErrorPayload>,
}

/// Error object in a response frame.
#[derive(Debug, Clone, Deserialize)]
struct CdpErrorPayload {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

/// Inbound event frame: `{"method", "params"}`, no id.
#[derive(Debug, Clone, Deserialize)]
struct EventFrame {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum InboundFrame {
    Response(ResponseFrame),
    Event(EventFrame),
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;
type SubscriberMap = HashMap<String, Vec<(u64, mpsc::UnboundedSender<Value>)>>;

/// A live subscription to one event method.
///
/// Dropping the subscription removes exactly this subscriber from the
/// connection's registry; other subscribers for the same method are
/// unaffected.
pub struct EventSubscription {
    method: String,
    token: u64,
    rx: mpsc::UnboundedReceiver<Value>,
    subscribers: Arc<ParkingLotMutex<SubscriberMap>>,
}

impl EventSubscription {
    /// Receive the next event's params.
    ///
    /// Returns `None` once the connection has shut down.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(&self.method) {
            list.retain(|(token, _)| *token != self.token);
            if list.is_empty() {
                subscribers.remove(&self.method);
            }
        }
    }
}

/// Persistent connection to a browser's remote-debugging endpoint.
///
/// One connection per automation session. Torn down by [`disconnect`], which
/// rejects every in-flight call before returning; sends after that fail with
/// [`Error::NotConnected`].
///
/// [`disconnect`]: CdpConnection::disconnect
pub struct CdpConnection {
    next_id: AtomicU64,
    next_token: AtomicU64,
    pending: Arc<TokioMutex<PendingMap>>,
    subscribers: Arc<ParkingLotMutex<SubscriberMap>>,
    sender: TokioMutex<Option<WebSocketTransportSender>>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Browser", default)]
    browser: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

impl CdpConnection {
    /// Resolve the debugging endpoint's WebSocket URL and connect to it.
    ///
    /// Discovery is a plain HTTP GET against `/json/version` on the given
    /// host/port; the response's `webSocketDebuggerUrl` field names the
    /// socket to open. Fails with [`Error::ConnectionFailed`] if discovery
    /// or the handshake fails.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let version_url = format!("http://{host}:{port}/json/version");

        let info: VersionInfo = reqwest::get(&version_url)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("discovery GET {version_url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::ConnectionFailed(format!("discovery GET {version_url}: {e}")))?
            .json()
            .await
            .map_err(|e| {
                Error::ConnectionFailed(format!("discovery response was not valid JSON: {e}"))
            })?;

        if let Some(browser) = &info.browser {
            tracing::info!(browser = %browser, "discovered debugging endpoint");
        }

        Self::connect_url(&info.web_socket_debugger_url).await
    }

    /// Connect to an explicit WebSocket debugger URL, skipping discovery.
    pub async fn connect_url(ws_url: &str) -> Result<Self> {
        tracing::info!(url = ws_url, "connecting to debugging WebSocket");

        let (transport, mut message_rx) = WebSocketTransport::connect(ws_url).await?;
        let (sender, mut receiver) = transport.into_parts();

        let pending: Arc<TokioMutex<PendingMap>> = Arc::new(TokioMutex::new(HashMap::new()));
        let subscribers: Arc<ParkingLotMutex<SubscriberMap>> =
            Arc::new(ParkingLotMutex::new(HashMap::new()));

        tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                tracing::warn!(error = %e, "transport receiver stopped");
            }
        });

        let pending_clone = Arc::clone(&pending);
        let subscribers_clone = Arc::clone(&subscribers);
        tokio::spawn(async move {
            while let Some(frame) = message_rx.recv().await {
                Self::dispatch(&pending_clone, &subscribers_clone, frame).await;
            }
            // Socket is gone: no response can arrive for anything in flight.
            Self::drain_pending(&pending_clone).await;
            subscribers_clone.lock().clear();
            tracing::info!("debugging connection closed");
        });

        tracing::info!(url = ws_url, "debugging WebSocket connection established");

        Ok(Self {
            next_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            pending,
            subscribers,
            sender: TokioMutex::new(Some(sender)),
        })
    }

    /// Send a command without a session scope (browser-level methods).
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_on(method, params, None).await
    }

    /// Send a command, optionally scoped to an attached session.
    ///
    /// Resolves with the response's `result` payload, or fails with
    /// [`Error::Cdp`] built from the response's `error` field.
    pub async fn send_on(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let frame = serde_json::to_value(CommandFrame {
            id,
            method,
            params,
            session_id,
        })?;

        // Register the pending entry before writing to avoid racing the
        // response.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut sender = self.sender.lock().await;
            let Some(sender) = sender.as_mut() else {
                self.pending.lock().await.remove(&id);
                return Err(Error::NotConnected);
            };
            if let Err(e) = sender.send(frame).await {
                self.pending.lock().await.remove(&id);
                return Err(e);
            }
        }

        tracing::debug!(id, method, session = ?session_id, "sent command");

        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Subscribe to an event method.
    ///
    /// Multiple subscribers per method are supported; each receives every
    /// event's `params`. Delivery order follows the transport's frame order.
    pub fn subscribe(&self, method: &str) -> EventSubscription {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers
            .lock()
            .entry(method.to_string())
            .or_default()
            .push((token, tx));

        EventSubscription {
            method: method.to_string(),
            token,
            rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Whether the connection is still usable for sends.
    pub async fn is_connected(&self) -> bool {
        self.sender.lock().await.is_some()
    }

    /// Close the connection.
    ///
    /// Every in-flight request is rejected with [`Error::ConnectionClosed`]
    /// before this returns; no pending callback is orphaned.
    pub async fn disconnect(&self) {
        let mut sender = self.sender.lock().await;
        if let Some(mut s) = sender.take() {
            if let Err(e) = s.close().await {
                tracing::debug!(error = %e, "error closing WebSocket");
            }
        }
        drop(sender);

        Self::drain_pending(&self.pending).await;
    }

    async fn dispatch(
        pending: &TokioMutex<PendingMap>,
        subscribers: &ParkingLotMutex<SubscriberMap>,
        frame: Value,
    ) {
        match serde_json::from_value::<InboundFrame>(frame) {
            Ok(InboundFrame::Response(response)) => {
                let entry = pending.lock().await.remove(&response.id);
                match entry {
                    Some(tx) => {
                        let result = match response.error {
                            Some(err) => Err(Error::Cdp {
                                code: err.code,
                                message: match err.data {
                                    Some(data) => format!("{} ({data})", err.message),
                                    None => err.message,
                                },
                            }),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(result);
                    }
                    None => {
                        tracing::debug!(id = response.id, "response for unknown command id");
                    }
                }
            }
            Ok(InboundFrame::Event(event)) => {
                let mut subscribers = subscribers.lock();
                if let Some(list) = subscribers.get_mut(&event.method) {
                    // Closed receivers are pruned as they are discovered.
                    list.retain(|(_, tx)| tx.send(event.params.clone()).is_ok());
                    if list.is_empty() {
                        subscribers.remove(&event.method);
                    }
                } else {
                    tracing::trace!(method = %event.method, "event with no subscribers");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "inbound frame is neither response nor event");
            }
        }
    }

    async fn drain_pending(pending: &TokioMutex<PendingMap>) {
        let mut pending = pending.lock().await;
        for (id, tx) in pending.drain() {
            tracing::debug!(id, "rejecting in-flight command on shutdown");
            let _ = tx.send(Err(Error::ConnectionClosed));
        }
    }
}
