//! Client for the hosted realtime service: joins the `messages` change feed
//! and forwards inserted rows into an mpsc channel.
//!
//! The connection lives as long as the receiver. Once the receiver is dropped
//! the task leaves the channel and closes the socket.

use crate::types::messaging::Message;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const TOPIC: &str = "realtime:public:messages";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base URL of the hosted project, e.g. `https://abcd.supabase.co`.
    pub project_url: String,
    pub api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("invalid project url {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("join rejected: {0}")]
    JoinRejected(String),
    #[error("connection closed by server")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Insert(Message),
    JoinError(String),
    Ignored,
}

pub(crate) fn socket_url(config: &RealtimeConfig) -> Result<String, FeedError> {
    let base = config.project_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(FeedError::InvalidUrl(config.project_url.clone()));
    };
    Ok(format!(
        "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        config.api_key.trim()
    ))
}

pub(crate) fn join_frame(api_key: &str) -> String {
    json!({
        "topic": TOPIC,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": "public", "table": "messages" }
                ]
            },
            "access_token": api_key,
        },
        "ref": "1",
        "join_ref": "1",
    })
    .to_string()
}

fn heartbeat_frame(reference: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
    .to_string()
}

pub(crate) fn decode_frame(text: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<JsonValue>(text) else {
        return Frame::Ignored;
    };
    if value["topic"] != TOPIC {
        return Frame::Ignored;
    }

    match value["event"].as_str() {
        Some("phx_reply") if value["payload"]["status"] == "error" => {
            Frame::JoinError(value["payload"]["response"].to_string())
        }
        Some("postgres_changes") => {
            let data = &value["payload"]["data"];
            if data["type"] != "INSERT" || data["table"] != "messages" {
                return Frame::Ignored;
            }
            decode_record(&data["record"])
        }
        // Older servers push the change directly.
        Some("INSERT") if value["payload"]["table"] == "messages" => {
            decode_record(&value["payload"]["record"])
        }
        _ => Frame::Ignored,
    }
}

fn decode_record(record: &JsonValue) -> Frame {
    match serde_json::from_value::<Message>(record.clone()) {
        Ok(message) => Frame::Insert(message),
        Err(err) => {
            tracing::warn!(error = %err, "unreadable message record on feed");
            Frame::Ignored
        }
    }
}

/// Reconnect delay, doubling up to [`MAX_BACKOFF_SECS`].
#[derive(Debug)]
struct Backoff {
    secs: u64,
}

impl Backoff {
    fn new() -> Self {
        Self { secs: 1 }
    }

    fn reset(&mut self) {
        self.secs = 1;
    }

    /// Delay before the next attempt.
    fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.secs);
        self.secs = (self.secs * 2).min(MAX_BACKOFF_SECS);
        delay
    }
}

/// Why a connection ended. `joined` is set once the join frame went out.
#[derive(Debug)]
struct Dropped {
    joined: bool,
    error: FeedError,
}

/// Opens the feed in the background. Reconnects with backoff until the
/// returned receiver is dropped.
pub fn spawn_feed(config: RealtimeConfig, capacity: usize) -> mpsc::Receiver<Message> {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::spawn(async move {
        let mut backoff = Backoff::new();
        loop {
            let dropped = match stream_once(&config, &tx).await {
                Ok(()) => break,
                Err(dropped) => dropped,
            };
            if let FeedError::InvalidUrl(url) = &dropped.error {
                tracing::error!(url = %url, "realtime feed disabled: invalid project url");
                break;
            }
            if tx.is_closed() {
                break;
            }
            if dropped.joined {
                backoff.reset();
            }
            let delay = backoff.next_delay();
            tracing::warn!(
                error = %dropped.error,
                backoff_secs = delay.as_secs(),
                "realtime feed dropped, reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tx.closed() => break,
            }
        }
        tracing::debug!("realtime feed task finished");
    });
    rx
}

/// Runs one connection. `Ok` means the receiver went away.
async fn stream_once(config: &RealtimeConfig, tx: &mpsc::Sender<Message>) -> Result<(), Dropped> {
    let not_joined = |error: FeedError| Dropped {
        joined: false,
        error,
    };
    let url = socket_url(config).map_err(not_joined)?;
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .map_err(|err| not_joined(err.into()))?;
    socket
        .send(WsMessage::Text(join_frame(config.api_key.trim()).into()))
        .await
        .map_err(|err| not_joined(err.into()))?;
    tracing::info!(topic = TOPIC, "joined realtime feed");

    let joined = |error: FeedError| Dropped {
        joined: true,
        error,
    };
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                let _ = socket.close(None).await;
                return Ok(());
            }
            _ = heartbeat.tick() => {
                reference += 1;
                socket
                    .send(WsMessage::Text(heartbeat_frame(reference).into()))
                    .await
                    .map_err(|err| joined(err.into()))?;
            }
            frame = socket.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => return Err(joined(FeedError::Closed)),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(joined(err.into())),
                };
                match decode_frame(text.as_str()) {
                    Frame::Insert(message) => {
                        if tx.send(message).await.is_err() {
                            let _ = socket.close(None).await;
                            return Ok(());
                        }
                    }
                    Frame::JoinError(reason) => {
                        return Err(Dropped {
                            joined: false,
                            error: FeedError::JoinRejected(reason),
                        });
                    }
                    Frame::Ignored => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn config(url: &str) -> RealtimeConfig {
        RealtimeConfig {
            project_url: url.to_string(),
            api_key: "anon-key".to_string(),
        }
    }

    #[test]
    fn socket_url__should_switch_to_websocket_scheme() {
        assert_eq!(
            socket_url(&config("https://abcd.supabase.co/")).expect("url"),
            "wss://abcd.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
        assert!(socket_url(&config("ftp://abcd")).is_err());
    }

    #[test]
    fn join_frame__should_request_message_inserts() {
        let frame: JsonValue = serde_json::from_str(&join_frame("anon-key")).expect("json");

        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["topic"], TOPIC);
        let change = &frame["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["table"], "messages");
    }

    #[test]
    fn decode_frame__should_extract_inserted_message() {
        // Given
        let text = r#"{
            "topic": "realtime:public:messages",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "schema": "public",
                    "table": "messages",
                    "type": "INSERT",
                    "commit_timestamp": "2025-03-01T10:00:00Z",
                    "record": {
                        "id": "m1",
                        "conversation_id": "c1",
                        "sender_id": "u2",
                        "content": "Hola",
                        "created_at": "2025-03-01T10:00:00.123456+00:00"
                    }
                },
                "ids": [1]
            },
            "ref": null
        }"#;

        // When
        let frame = decode_frame(text);

        // Then
        match frame {
            Frame::Insert(message) => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.conversation_id, "c1");
                assert_eq!(message.sender_id, "u2");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decode_frame__should_ignore_replies_heartbeats_and_garbage() {
        assert_eq!(
            decode_frame(r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"2"}"#),
            Frame::Ignored
        );
        assert_eq!(
            decode_frame(r#"{"topic":"realtime:public:messages","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#),
            Frame::Ignored
        );
        assert_eq!(decode_frame("not json"), Frame::Ignored);
    }

    #[test]
    fn backoff__should_double_up_to_cap_and_restart_after_reset() {
        // Given
        let mut backoff = Backoff::new();

        // When
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();

        // Then
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn spawn_feed__should_reconnect_quickly_after_joined_connection_drops() {
        // Given
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake realtime");
        let addr = listener.local_addr().expect("local addr");
        let (joins_tx, mut joins_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let joins_tx = joins_tx.clone();
                tokio::spawn(async move {
                    let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    if let Some(Ok(WsMessage::Text(text))) = socket.next().await {
                        let _ = joins_tx.send(text.as_str().to_string());
                    }
                    let _ = socket.close(None).await;
                });
            }
        });
        let feed = spawn_feed(config(&format!("http://{addr}")), 4);

        // When
        let mut joins = 0;
        let waited = tokio::time::timeout(Duration::from_secs(6), async {
            while joins < 4 {
                joins_rx.recv().await.expect("join frame");
                joins += 1;
            }
        })
        .await;

        // Then
        assert!(waited.is_ok(), "only {joins} joins before timeout");
        drop(feed);
    }

    #[test]
    fn decode_frame__should_report_rejected_join() {
        let frame = decode_frame(
            r#"{"topic":"realtime:public:messages","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#,
        );

        assert!(matches!(frame, Frame::JoinError(reason) if reason.contains("unauthorized")));
    }
}
