//! Bus adapter — JSON-RPC 2.0 over WebSocket to the policy manager.
//!
//! The core treats the transport as a collaborator behind two seams: the
//! [`StatusSink`] implementation that carries acknowledgments out, and the
//! serve loop that feeds inbound decision signals into the [`Dispatcher`].
//! Decision signals arrive as notifications whose method carries the signal
//! name under the fixed `policy.` scope (`policy.actions` → signal
//! `actions`); acknowledgments leave as `policy.status` notifications.

pub mod handshake;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::signaling::{Dispatcher, StatusSink};

/// Method scope the manager uses for decision traffic.
pub const POLICY_SCOPE: &str = "policy.";
/// Outbound acknowledgment notification.
pub const STATUS_METHOD: &str = "policy.status";
/// Handshake methods on the manager connection.
pub const REGISTER_METHOD: &str = "policy.register";
pub const UNREGISTER_METHOD: &str = "policy.unregister";
/// Match-rule installation on the bus itself.
pub const ADD_MATCH_METHOD: &str = "bus.addMatch";
pub const REMOVE_MATCH_METHOD: &str = "bus.removeMatch";

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("manager returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("connection closed by manager")]
    Closed,
    #[error("no reply to {method} within {timeout_ms} ms")]
    Timeout {
        method: &'static str,
        timeout_ms: u64,
    },
}

// ─── JSON-RPC 2.0 framing ────────────────────────────────────────────────────

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Deserialize)]
struct RpcInbound {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

// ─── Status emission ─────────────────────────────────────────────────────────

/// Channel-backed [`StatusSink`]: the coordinator pushes acknowledgments in,
/// the serve loop drains them into outbound `policy.status` notifications.
#[derive(Clone)]
pub struct SignalEmitter {
    tx: mpsc::UnboundedSender<(u32, bool)>,
}

impl SignalEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(u32, bool)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for SignalEmitter {
    fn emit_status(&self, txid: u32, success: bool) {
        // Receiver gone means the connection is shutting down — no-one left
        // to report to.
        let _ = self.tx.send((txid, success));
    }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// One WebSocket connection to the manager's bus endpoint.
pub struct BusConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl BusConnection {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let (stream, _) = connect_async(url).await?;
        info!(url = %url, "connected to policy manager");
        Ok(Self { stream, next_id: 0 })
    }

    /// One id-correlated round trip. With `bound` set, the wait for the
    /// reply is cut off after that long; without it the call blocks until
    /// the manager answers or the connection dies.
    pub async fn call(
        &mut self,
        method: &'static str,
        params: Value,
        bound: Option<Duration>,
    ) -> Result<Value, BusError> {
        self.next_id += 1;
        let id = self.next_id;
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params: Some(params),
        };
        self.stream
            .send(Message::Text(serde_json::to_string(&request)?))
            .await?;

        let stream = &mut self.stream;
        let reply = async move {
            loop {
                match stream.next().await {
                    None => return Err(BusError::Closed),
                    Some(Err(e)) => return Err(BusError::Transport(e)),
                    Some(Ok(Message::Close(_))) => return Err(BusError::Closed),
                    Some(Ok(Message::Text(text))) => {
                        let msg: RpcInbound = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(err = %e, "unparseable bus frame — skipped");
                                continue;
                            }
                        };
                        if msg.id.as_ref().and_then(Value::as_u64) != Some(id) {
                            // The manager does not signal before registration
                            // completes; anything else here is stray traffic.
                            debug!(method, "unrelated frame while awaiting reply — skipped");
                            continue;
                        }
                        if let Some(err) = msg.error {
                            return Err(BusError::Rpc {
                                code: err.code,
                                message: err.message,
                            });
                        }
                        return Ok(msg.result.unwrap_or(Value::Null));
                    }
                    Some(Ok(_)) => {}
                }
            }
        };

        match bound {
            Some(t) => tokio::time::timeout(t, reply)
                .await
                .map_err(|_| BusError::Timeout {
                    method,
                    timeout_ms: t.as_millis() as u64,
                })?,
            None => reply.await,
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<(), BusError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: Some(params),
        };
        self.stream
            .send(Message::Text(serde_json::to_string(&request)?))
            .await?;
        Ok(())
    }

    async fn send_status(&mut self, txid: u32, success: bool) -> Result<(), BusError> {
        let status: u32 = if success { 1 } else { 0 };
        debug!(txid, status, "status signal sent");
        self.notify(STATUS_METHOD, json!([txid, status])).await
    }

    /// Serve decision traffic until a shutdown signal or a transport error.
    ///
    /// Inbound signals are dispatched one at a time on this task; two
    /// messages are never decoded concurrently. Acknowledgments queued by
    /// handlers (inline or deferred) drain out between messages.
    pub async fn serve(
        &mut self,
        dispatcher: Arc<Dispatcher>,
        mut status_rx: mpsc::UnboundedReceiver<(u32, bool)>,
    ) -> Result<(), BusError> {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("shutdown signal received — leaving the decision loop");
                    return Ok(());
                }

                Some((txid, success)) = status_rx.recv() => {
                    self.send_status(txid, success).await?;
                }

                frame = self.stream.next() => {
                    match frame {
                        None => return Err(BusError::Closed),
                        Some(Err(e)) => return Err(BusError::Transport(e)),
                        Some(Ok(Message::Close(_))) => return Err(BusError::Closed),
                        Some(Ok(Message::Text(text))) => handle_frame(&text, &dispatcher),
                        Some(Ok(_)) => {} // ping/pong/binary — transport noise
                    }
                }
            }
        }
    }
}

/// Route one inbound frame. Only `policy.*` notifications are decision
/// traffic; our own `policy.status` member and plain responses are not.
fn handle_frame(text: &str, dispatcher: &Dispatcher) {
    let msg: RpcInbound = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(err = %e, "unparseable bus frame — skipped");
            return;
        }
    };

    let Some(method) = msg.method.as_deref() else {
        debug!("stray response frame — ignored");
        return;
    };
    if method == STATUS_METHOD {
        debug!("status signal echoed back — ignored");
        return;
    }
    let Some(signal) = method.strip_prefix(POLICY_SCOPE) else {
        debug!(method, "frame outside the policy scope — ignored");
        return;
    };

    let params = msg.params.unwrap_or(Value::Null);
    dispatcher.dispatch(signal, &params);
}

/// Resolves when the process is asked to stop: SIGTERM on Unix, Ctrl-C
/// everywhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(err = %e, "SIGTERM handler unavailable — Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{SubscriptionRegistry, TransactionCoordinator};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        statuses: Mutex<Vec<(u32, bool)>>,
    }

    impl RecordingSink {
        fn statuses(&self) -> Vec<(u32, bool)> {
            self.statuses.lock().unwrap().clone()
        }
    }

    impl StatusSink for RecordingSink {
        fn emit_status(&self, txid: u32, success: bool) {
            self.statuses.lock().unwrap().push((txid, success));
        }
    }

    fn make_dispatcher() -> (Arc<RecordingSink>, Arc<SubscriptionRegistry>, Dispatcher) {
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let coordinator = TransactionCoordinator::new(sink.clone());
        let dispatcher = Dispatcher::new(registry.clone(), coordinator);
        (sink, registry, dispatcher)
    }

    #[test]
    fn decision_notification_is_dispatched() {
        let (sink, _registry, dispatcher) = make_dispatcher();
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "policy.actions",
            "params": [7, [["audio_route", [[["type", "sink"]]]]]]
        })
        .to_string();

        handle_frame(&frame, &dispatcher);
        assert_eq!(sink.statuses(), vec![(7, true)]);
    }

    #[test]
    fn own_status_member_is_not_dispatched() {
        let (sink, _registry, dispatcher) = make_dispatcher();
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "policy.status",
            "params": [7, 1]
        })
        .to_string();

        handle_frame(&frame, &dispatcher);
        assert!(sink.statuses().is_empty());
    }

    #[test]
    fn frames_outside_the_scope_are_ignored() {
        let (sink, _registry, dispatcher) = make_dispatcher();
        for frame in [
            json!({"jsonrpc": "2.0", "method": "bus.ping", "params": []}).to_string(),
            json!({"jsonrpc": "2.0", "id": 3, "result": {}}).to_string(),
            "not even json".to_string(),
        ] {
            handle_frame(&frame, &dispatcher);
        }
        assert!(sink.statuses().is_empty());
    }

    #[test]
    fn emitter_feeds_the_status_channel() {
        let (emitter, mut rx) = SignalEmitter::channel();
        emitter.emit_status(7, true);
        emitter.emit_status(8, false);
        assert_eq!(rx.try_recv().ok(), Some((7, true)));
        assert_eq!(rx.try_recv().ok(), Some((8, false)));
    }
}
