//! DevTools protocol connection.
//!
//! Speaks JSON-RPC over a WebSocket to a page target: commands carry
//! auto-incremented ids and are correlated back to callers through a
//! pending map; unsolicited messages are protocol events and are handed
//! to the engine through an unbounded channel. One background task owns
//! the read half of the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{BrowserError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>;

/// An unsolicited protocol event (e.g. `Page.loadEventFired`).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method name.
    pub method: String,
    /// Event parameters.
    pub params: Value,
}

/// A correlated reply to a command.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    /// Id of the command this replies to.
    pub id: u64,
    /// Result payload on success.
    pub result: Option<Value>,
    /// Error body on failure.
    pub error: Option<CdpErrorBody>,
}

/// Error object carried in a failed reply.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CdpErrorBody {
    pub code: i64,
    pub message: String,
}

/// A classified incoming protocol message.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// A reply to a pending command.
    Reply(CdpResponse),
    /// An unsolicited event.
    Event(CdpEvent),
}

/// Connection to one DevTools page target.
///
/// Cheap to share behind an [`Arc`]; the write half is mutex-guarded and
/// command correlation is lock-per-message.
pub struct CdpConnection {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<WsSink>,
    default_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Opens a connection to `ws_url` and returns it together with the
    /// stream of protocol events read off the socket.
    pub async fn connect(
        ws_url: &str,
        default_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CdpEvent>)> {
        info!(url = ws_url, "connecting to DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Connection {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let pending_clone = Arc::clone(&pending);
        let reader_handle = tokio::spawn(async move {
            Self::read_loop(reader, pending_clone, event_tx).await;
        });

        let connection = Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            default_timeout,
            reader_handle,
        };
        Ok((connection, event_rx))
    }

    /// Sends a command and awaits its reply under the default timeout.
    pub async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.command_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Sends a command and awaits its reply under an explicit timeout.
    pub async fn command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = build_message(id, method, &params);
        let json = message.to_string();

        debug!(id, method, "sending devtools command");

        // Park the waiter before writing so a fast reply cannot slip past.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.send(Message::Text(json)).await {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::Protocol(format!(
                    "failed to send WebSocket message: {e}"
                )));
            }
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BrowserError::Protocol(
                    "reply channel closed before a response arrived".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BrowserError::CommandTimeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
        };

        if let Some(error) = response.error {
            return Err(BrowserError::Command {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Enables a protocol domain so it starts emitting events.
    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        let method = format!("{domain}.enable");
        self.command(&method, serde_json::json!({})).await?;
        Ok(())
    }

    /// Stops the reader task. Pending commands fail on their own when
    /// the socket goes away.
    pub fn abort(&self) {
        self.reader_handle.abort();
    }

    async fn read_loop(mut reader: WsSource, pending: PendingMap, event_tx: mpsc::UnboundedSender<CdpEvent>) {
        while let Some(message) = reader.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    info!("WebSocket closed by remote");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "discarding unparseable devtools message");
                    continue;
                }
            };

            match classify(&json) {
                Some(Incoming::Reply(response)) => {
                    let mut pending = pending.lock().await;
                    if let Some(tx) = pending.remove(&response.id) {
                        let _ = tx.send(response);
                    } else {
                        debug!(id = response.id, "reply for unknown command id");
                    }
                }
                Some(Incoming::Event(event)) => {
                    // A closed receiver just means the engine is gone.
                    let _ = event_tx.send(event);
                }
                None => {
                    debug!("devtools message is neither reply nor event");
                }
            }
        }

        // The socket is gone; fail whoever is still waiting.
        let mut pending = pending.lock().await;
        for (id, tx) in pending.drain() {
            let _ = tx.send(CdpResponse {
                id,
                result: None,
                error: Some(CdpErrorBody {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                }),
            });
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Builds the wire form of a command.
pub fn build_message(id: u64, method: &str, params: &Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Classifies an incoming message: replies carry an `id`, events a
/// `method` without one.
pub fn classify(json: &Value) -> Option<Incoming> {
    if let Some(id) = json.get("id").and_then(Value::as_u64) {
        return Some(Incoming::Reply(CdpResponse {
            id,
            result: json.get("result").cloned(),
            error: json
                .get("error")
                .and_then(|e| serde_json::from_value(e.clone()).ok()),
        }));
    }
    if let Some(method) = json.get("method").and_then(Value::as_str) {
        return Some(Incoming::Event(CdpEvent {
            method: method.to_string(),
            params: json.get("params").cloned().unwrap_or(Value::Null),
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_message_shape() {
        let message = build_message(7, "Page.navigate", &json!({ "url": "http://example.org" }));
        assert_eq!(message["id"], 7);
        assert_eq!(message["method"], "Page.navigate");
        assert_eq!(message["params"]["url"], "http://example.org");
    }

    #[test]
    fn test_classify_success_reply() {
        let json = json!({ "id": 3, "result": { "frameId": "F1" } });
        match classify(&json) {
            Some(Incoming::Reply(reply)) => {
                assert_eq!(reply.id, 3);
                assert_eq!(reply.result.unwrap()["frameId"], "F1");
                assert!(reply.error.is_none());
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_reply() {
        let json = json!({
            "id": 4,
            "error": { "code": -32000, "message": "Cannot navigate to invalid URL" }
        });
        match classify(&json) {
            Some(Incoming::Reply(reply)) => {
                let error = reply.error.unwrap();
                assert_eq!(error.code, -32000);
                assert_eq!(error.message, "Cannot navigate to invalid URL");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_event() {
        let json = json!({
            "method": "Page.loadEventFired",
            "params": { "timestamp": 123.4 }
        });
        match classify(&json) {
            Some(Incoming::Event(event)) => {
                assert_eq!(event.method, "Page.loadEventFired");
                assert_eq!(event.params["timestamp"], 123.4);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(classify(&json!({ "neither": true })).is_none());
        assert!(classify(&json!("just a string")).is_none());
    }

    #[test]
    fn test_event_without_params_defaults_null() {
        let json = json!({ "method": "Inspector.detached" });
        match classify(&json) {
            Some(Incoming::Event(event)) => assert_eq!(event.params, Value::Null),
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
