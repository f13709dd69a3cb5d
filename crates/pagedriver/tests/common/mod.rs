//! Shared test support: tracing setup and a scriptable mock CDP endpoint.
//!
//! The mock speaks the debugging wire protocol over a real WebSocket:
//! inbound frames are recorded and answered from per-method responders, and
//! tests can push arbitrary frames (events, out-of-order responses) to the
//! connected client at any time.

#![allow(dead_code)] // each integration test binary uses a subset

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

static INIT: std::sync::Once = std::sync::Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// How the mock answers one method.
#[derive(Clone)]
pub enum Responder {
    /// Answer every call with this result payload.
    Result(Value),
    /// Answer every call with this protocol error.
    Error { code: i64, message: String },
    /// Never answer; the command stays pending on the client.
    Silent,
    /// Answer successive calls with successive payloads, repeating the last.
    Seq(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct ReceivedCommand {
    pub id: u64,
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

struct MockState {
    handlers: Mutex<HashMap<String, Responder>>,
    seq_positions: Mutex<HashMap<String, usize>>,
    received: Mutex<Vec<ReceivedCommand>>,
}

pub struct MockCdp {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    push_tx: mpsc::UnboundedSender<Value>,
}

impl MockCdp {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            handlers: Mutex::new(HashMap::new()),
            seq_positions: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        });

        let (push_tx, push_rx) = mpsc::unbounded_channel::<Value>();
        let push_rx = Arc::new(tokio::sync::Mutex::new(Some(push_rx)));

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };

                // Only one client connects per test; hand it the push channel.
                let mut push_rx_opt = push_rx.lock().await.take();

                loop {
                    tokio::select! {
                        inbound = ws.next() => {
                            let Some(Ok(msg)) = inbound else { break };
                            let text = match msg {
                                WsMessage::Text(text) => text.to_string(),
                                WsMessage::Close(_) => break,
                                _ => continue,
                            };
                            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            if let Some(reply) = server_state.handle_command(&frame) {
                                let _ = ws.send(WsMessage::Text(reply.to_string().into())).await;
                            }
                        }
                        pushed = recv_or_pending(&mut push_rx_opt) => {
                            match pushed {
                                Some(frame) => {
                                    let _ = ws
                                        .send(WsMessage::Text(frame.to_string().into()))
                                        .await;
                                }
                                // Push channel closed: disarm this arm.
                                None => push_rx_opt = None,
                            }
                        }
                    }
                }

                if let Some(rx) = push_rx_opt {
                    *push_rx.lock().await = Some(rx);
                }
            }
        });

        Self {
            addr,
            state,
            push_tx,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/devtools/browser/mock", self.addr)
    }

    // -- scripting ----------------------------------------------------------

    pub fn on(&self, method: &str, result: Value) {
        self.state
            .handlers
            .lock()
            .insert(method.to_string(), Responder::Result(result));
    }

    pub fn on_error(&self, method: &str, code: i64, message: &str) {
        self.state.handlers.lock().insert(
            method.to_string(),
            Responder::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    pub fn on_seq(&self, method: &str, results: Vec<Value>) {
        self.state
            .handlers
            .lock()
            .insert(method.to_string(), Responder::Seq(results));
        self.state.seq_positions.lock().remove(method);
    }

    pub fn silent(&self, method: &str) {
        self.state
            .handlers
            .lock()
            .insert(method.to_string(), Responder::Silent);
    }

    /// Push a raw frame (event or hand-built response) to the client.
    pub fn push_raw(&self, frame: Value) {
        self.push_tx.send(frame).unwrap();
    }

    /// Push an event frame to the client.
    pub fn push_event(&self, method: &str, params: Value) {
        self.push_raw(json!({"method": method, "params": params}));
    }

    // -- inspection ---------------------------------------------------------

    pub fn received(&self) -> Vec<ReceivedCommand> {
        self.state.received.lock().clone()
    }

    pub fn calls_of(&self, method: &str) -> Vec<ReceivedCommand> {
        self.received()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    /// Wait until at least `n` calls of `method` have been received.
    pub async fn wait_for_calls(&self, method: &str, n: usize) -> Vec<ReceivedCommand> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let calls = self.calls_of(method);
            if calls.len() >= n {
                return calls;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "mock never received {n} calls of {method}; got {}",
                    calls.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_call(&self, method: &str) -> ReceivedCommand {
        self.wait_for_calls(method, 1).await.remove(0)
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::UnboundedReceiver<Value>>) -> Option<Value> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl MockState {
    /// Record an inbound command and build its reply, if any.
    fn handle_command(&self, frame: &Value) -> Option<Value> {
        let id = frame.get("id")?.as_u64()?;
        let method = frame.get("method")?.as_str()?.to_string();
        let params = frame.get("params").cloned().unwrap_or(json!({}));
        let session_id = frame
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.received.lock().push(ReceivedCommand {
            id,
            method: method.clone(),
            params,
            session_id: session_id.clone(),
        });

        let responder = self
            .handlers
            .lock()
            .get(&method)
            .cloned()
            .unwrap_or(Responder::Result(json!({})));

        let mut reply = match responder {
            Responder::Result(result) => json!({"id": id, "result": result}),
            Responder::Error { code, message } => {
                json!({"id": id, "error": {"code": code, "message": message}})
            }
            Responder::Silent => return None,
            Responder::Seq(results) => {
                let mut positions = self.seq_positions.lock();
                let position = positions.entry(method).or_insert(0);
                let result = results
                    .get(*position)
                    .or_else(|| results.last())
                    .cloned()
                    .unwrap_or(json!({}));
                *position += 1;
                json!({"id": id, "result": result})
            }
        };

        if let Some(session) = session_id {
            reply["sessionId"] = json!(session);
        }
        Some(reply)
    }
}

// -- canned payloads --------------------------------------------------------

/// Wrap a value the way `Runtime.evaluate` returns it.
pub fn eval_value(value: Value) -> Value {
    json!({"result": {"type": "object", "value": value}})
}

/// One content page in a `Target.getTargets` response.
pub fn page_target(target_id: &str, title: &str, url: &str) -> Value {
    json!({
        "targetId": target_id,
        "type": "page",
        "title": title,
        "url": url,
        "attached": false,
    })
}

pub fn targets_response(targets: Vec<Value>) -> Value {
    json!({"targetInfos": targets})
}

/// Script the minimal handler set for one attachable page.
pub fn install_page(mock: &MockCdp, target_id: &str, session_id: &str, url: &str) {
    mock.on(
        "Target.getTargets",
        targets_response(vec![page_target(target_id, "Mock Page", url)]),
    );
    mock.on("Target.attachToTarget", json!({"sessionId": session_id}));
}
