use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<TransportResponse>>;

static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// Upper bound for one browser-level round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Screenshots of tall, dense pages can take a while to rasterize.
const TARGET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(crate) enum TransportMessage {
    Request(Value, Reply),
    /// Wait for the `receivedMessageFromTarget` frame carrying this inner id.
    ListenTargetMessage(u64, Reply),
    /// Wait for the next `method` event emitted by a target session.
    ListenEvent {
        session_id: String,
        method: String,
        tx: oneshot::Sender<Value>,
    },
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// Browser-level reply. CDP sends `error` instead of `result` on failure.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

/// `Target.receivedMessageFromTarget` notification.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

/// Where an incoming frame should be delivered.
#[derive(Debug)]
enum Routed {
    Response(Response),
    Target(u64, TargetMessage),
    /// Event from a target session: session id, method, params.
    Event(String, String, Value),
    Ignored,
}

fn route(text: &str) -> Routed {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Routed::Ignored;
    };

    if value.get("id").is_some() {
        return match serde_json::from_value::<Response>(value) {
            Ok(response) => Routed::Response(response),
            Err(_) => Routed::Ignored,
        };
    }

    if value["method"] == "Target.receivedMessageFromTarget"
        && let Some(inner) = value["params"]["message"].as_str()
        && let Ok(inner) = serde_json::from_str::<Value>(inner)
    {
        if let Some(id) = inner.get("id").and_then(Value::as_u64) {
            return Routed::Target(
                id,
                TargetMessage {
                    params: value["params"].clone(),
                },
            );
        }
        if let (Some(session), Some(method)) = (
            value["params"]["sessionId"].as_str(),
            inner["method"].as_str(),
        ) {
            return Routed::Event(
                session.to_string(),
                method.to_string(),
                inner["params"].clone(),
            );
        }
    }

    Routed::Ignored
}

/// Owns the WebSocket and matches replies to pending requests by id.
struct TransportActor {
    pending: HashMap<u64, Reply>,
    listeners: HashMap<(String, String), Vec<oneshot::Sender<Value>>>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                Some(frame) = ws_stream.next() => {
                    match frame {
                        Ok(Message::Text(text)) => self.deliver(&text),
                        Ok(Message::Close(_)) | Err(_) => break,
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => self.forward(cmd, tx).await,
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending.insert(id, tx);
                        }
                        TransportMessage::ListenEvent { session_id, method, tx } => {
                            self.listeners.entry((session_id, method)).or_default().push(tx);
                        }
                        TransportMessage::Shutdown => {
                            let close = json!({ "id": next_id(), "method": "Browser.close", "params": {} });
                            let _ = self.ws_sink.send(Message::Text(close.to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(anyhow!("DevTools connection closed")));
        }
        debug!("Transport actor stopped");
    }

    fn deliver(&mut self, text: &str) {
        let (id, response) = match route(text) {
            Routed::Response(r) => (r.id, TransportResponse::Response(r)),
            Routed::Target(id, msg) => (id, TransportResponse::Target(msg)),
            Routed::Event(session_id, method, params) => {
                if let Some(waiters) = self.listeners.remove(&(session_id, method)) {
                    for tx in waiters {
                        let _ = tx.send(params.clone());
                    }
                }
                return;
            }
            Routed::Ignored => return,
        };
        if let Some(tx) = self.pending.remove(&id) {
            let _ = tx.send(Ok(response));
        }
    }

    async fn forward(&mut self, cmd: Value, tx: Reply) {
        let Some(id) = cmd["id"].as_u64() else {
            let _ = tx.send(Err(anyhow!("Command without id")));
            return;
        };
        // Register first, the reply may race the send completion.
        self.pending.insert(id, tx);
        if let Err(e) = self.ws_sink.send(Message::Text(cmd.to_string())).await {
            warn!("WebSocket send failed: {e}");
            if let Some(tx) = self.pending.remove(&id) {
                let _ = tx.send(Err(anyhow!("WebSocket send failed: {e}")));
            }
        }
    }
}

/// Asynchronous transport to the Chrome DevTools Protocol over WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
}

impl Transport {
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        let actor = TransportActor {
            pending: HashMap::new(),
            listeners: HashMap::new(),
            ws_sink,
            command_rx: rx,
        };
        tokio::spawn(actor.run(ws_stream));

        Ok(Self { tx })
    }

    /// Sends a browser-level command and awaits its reply.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let method = command["method"].as_str().unwrap_or("?").to_string();
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        let response = time::timeout(COMMAND_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for {method}"))?
            .map_err(|_| anyhow!("Response channel closed"))??;

        if let TransportResponse::Response(Response {
            error: Some(err), ..
        }) = &response
        {
            return Err(anyhow!("{method} failed: {err}"));
        }
        Ok(response)
    }

    /// Waits for the target message answering inner request `msg_id`.
    pub(crate) async fn get_target_msg(&self, msg_id: usize) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(TARGET_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for target message {msg_id}"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Registers interest in the next `method` event of a target session.
    ///
    /// Register before triggering the action that emits the event.
    pub(crate) async fn listen_for_event(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenEvent {
                session_id: session_id.to_string(),
                method: method.to_string(),
                tx,
            })
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(TransportMessage::Shutdown).await;
    }
}
