//! WebDriver BiDi log subscription
//!
//! When a session is created with `webSocketUrl: true`, drivers that speak
//! BiDi hand back a WebSocket URL. Subscribing to `log.entryAdded` there
//! delivers console output and uncaught errors from the moment the
//! subscription is acknowledged, page loads included.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{Error, Result};

/// Event carrying console calls and uncaught script errors
pub const LOG_ENTRY_ADDED: &str = "log.entryAdded";

/// Command id of the subscription request
const SUBSCRIBE_ID: u64 = 1;

/// One log entry from the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Console method (`log`, `warn`, ...) or the entry level for script errors
    pub level: String,
    pub text: String,
}

/// Any message the remote end sends
#[derive(Debug, Deserialize)]
struct BidiMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `log.entryAdded` parameters, the parts we read
#[derive(Debug, Deserialize)]
struct LogEntryParams {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    level: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<LogEntryParams> for LogEntry {
    fn from(params: LogEntryParams) -> Self {
        let level = match (params.kind.as_str(), params.method) {
            ("console", Some(method)) => method,
            _ => params.level,
        };
        Self {
            level,
            text: params.text.unwrap_or_default(),
        }
    }
}

/// Parse one text frame into a log entry, if it is one
fn parse_log_event(text: &str) -> Option<LogEntry> {
    let message: BidiMessage = serde_json::from_str(text).ok()?;
    if message.kind != "event" || message.method.as_deref() != Some(LOG_ENTRY_ADDED) {
        return None;
    }
    serde_json::from_value::<LogEntryParams>(message.params)
        .ok()
        .map(LogEntry::from)
}

/// Live `log.entryAdded` subscription
///
/// A reader task owns the socket and queues entries; [`drain`](Self::drain)
/// never waits on the browser.
pub struct LogSubscription {
    entries: mpsc::UnboundedReceiver<LogEntry>,
    reader: JoinHandle<()>,
}

impl LogSubscription {
    /// Connect to `ws_url` and subscribe to log events
    pub async fn connect(ws_url: &str, timeout: Duration) -> Result<Self> {
        tokio::time::timeout(timeout, Self::subscribe(ws_url))
            .await
            .map_err(|_| Error::timeout("BiDi log subscription", timeout))?
    }

    async fn subscribe(ws_url: &str) -> Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| Error::Protocol(format!("BiDi connect to {} failed: {}", ws_url, e)))?;
        let (mut sink, mut stream) = socket.split();

        let request = json!({
            "id": SUBSCRIBE_ID,
            "method": "session.subscribe",
            "params": { "events": [LOG_ENTRY_ADDED] }
        });
        sink.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| Error::Protocol(format!("BiDi send failed: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Events can arrive before the acknowledgement
        loop {
            let frame = stream
                .next()
                .await
                .ok_or_else(|| Error::Protocol("BiDi socket closed during subscribe".to_string()))?
                .map_err(|e| Error::Protocol(format!("BiDi receive failed: {}", e)))?;
            let Message::Text(text) = frame else {
                continue;
            };
            if let Some(entry) = parse_log_event(&text) {
                let _ = tx.send(entry);
                continue;
            }
            let Ok(message) = serde_json::from_str::<BidiMessage>(&text) else {
                continue;
            };
            if message.id != Some(SUBSCRIBE_ID) {
                continue;
            }
            if let Some(error) = message.error {
                return Err(Error::webdriver(
                    "session.subscribe",
                    &error,
                    message.message.as_deref().unwrap_or_default(),
                ));
            }
            break;
        }

        let reader = tokio::spawn(async move {
            // Keep the write half open for the lifetime of the subscription
            let _sink = sink;
            while let Some(Ok(frame)) = stream.next().await {
                if let Message::Text(text) = frame {
                    if let Some(entry) = parse_log_event(&text) {
                        if tx.send(entry).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!("BiDi log stream ended");
        });

        Ok(Self {
            entries: rx,
            reader,
        })
    }

    /// Take every entry received so far
    pub fn drain(&mut self) -> Vec<LogEntry> {
        let mut drained = Vec::new();
        while let Ok(entry) = self.entries.try_recv() {
            drained.push(entry);
        }
        drained
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one client, answer its subscribe with `reply`, then push `events`
    async fn stub_driver(reply: Value, events: Vec<Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let Some(Ok(Message::Text(request))) = socket.next().await else {
                panic!("expected subscribe command");
            };
            let request: Value = serde_json::from_str(&request).unwrap();
            assert_eq!(request["method"], "session.subscribe");
            assert_eq!(request["params"]["events"], json!([LOG_ENTRY_ADDED]));

            let mut reply = reply;
            reply["id"] = request["id"].clone();
            socket.send(Message::Text(reply.to_string())).await.unwrap();
            for event in events {
                socket.send(Message::Text(event.to_string())).await.unwrap();
            }
            // Hold the connection open until the client goes away
            while socket.next().await.is_some() {}
        });
        format!("ws://{}/session/s-1", addr)
    }

    fn log_event(params: Value) -> Value {
        json!({ "type": "event", "method": LOG_ENTRY_ADDED, "params": params })
    }

    #[test]
    fn test_parse_console_and_script_errors() {
        let console = log_event(json!({
            "type": "console", "method": "warn", "level": "warn",
            "text": "no OfflineAudioContext", "args": [], "timestamp": 1
        }));
        assert_eq!(
            parse_log_event(&console.to_string()),
            Some(LogEntry {
                level: "warn".to_string(),
                text: "no OfflineAudioContext".to_string()
            })
        );

        let uncaught = log_event(json!({
            "type": "javascript", "level": "error", "text": "ReferenceError: layai is not defined"
        }));
        assert_eq!(
            parse_log_event(&uncaught.to_string()).map(|e| e.level),
            Some("error".to_string())
        );

        let other = json!({ "type": "event", "method": "browsingContext.load", "params": {} });
        assert_eq!(parse_log_event(&other.to_string()), None);
        assert_eq!(parse_log_event("not json"), None);
    }

    #[tokio::test]
    async fn test_subscription_delivers_entries() {
        let url = stub_driver(
            json!({ "type": "success", "result": {} }),
            vec![
                log_event(json!({ "type": "console", "method": "log", "level": "info", "text": "LayAI boot" })),
                json!({ "type": "event", "method": "browsingContext.load", "params": {} }),
                log_event(json!({ "type": "javascript", "level": "error", "text": "boom" })),
            ],
        )
        .await;

        let mut subscription = LogSubscription::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let mut entries = Vec::new();
        for _ in 0..100 {
            entries.extend(subscription.drain());
            if entries.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            entries,
            vec![
                LogEntry { level: "log".to_string(), text: "LayAI boot".to_string() },
                LogEntry { level: "error".to_string(), text: "boom".to_string() },
            ]
        );
        assert!(subscription.drain().is_empty());
    }

    #[tokio::test]
    async fn test_refused_subscription_is_an_error() {
        let url = stub_driver(
            json!({ "type": "error", "error": "unknown command", "message": "no BiDi here" }),
            Vec::new(),
        )
        .await;

        let err = LogSubscription::connect(&url, Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::WebDriver { ref error, .. } if error == "unknown command"));
    }

    #[tokio::test]
    async fn test_unreachable_socket_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = LogSubscription::connect(&format!("ws://{}", addr), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
