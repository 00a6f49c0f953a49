//! WebSocket listener for streamed chat events
//!
//! [`ChatSocket::connect`] spawns a task that owns the connection and
//! reports connection status and incoming frames as [`SocketEvent`]s.
//! Dropping the event stream or the socket handle shuts the task down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::types::{CompletionMessage, Role};
use crate::error::{ChatDroidError, StoreResult};

const EVENT_BUFFER: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Connection status changes and incoming frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connecting,
    Connected,
    /// A text frame, or a binary frame decoded as UTF-8
    Message(String),
    Disconnected,
    Error(String),
}

/// Streaming completion request sent over the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_stream() -> bool {
    true
}

impl ChatStreamRequest {
    /// A streaming request carrying a single user message
    pub fn user(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![CompletionMessage {
                role: Role::User,
                content: content.into(),
            }],
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One chunk of a streamed completion
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "object")]
    pub object_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

impl ChatStreamChunk {
    /// Concatenated delta text of all choices
    pub fn delta_text(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.content.as_deref())
            .collect()
    }

    /// Whether any choice reports a finish reason
    pub fn is_finished(&self) -> bool {
        self.choices.iter().any(|c| c.finish_reason.is_some())
    }
}

/// Decode one streamed completion frame
///
/// Accepts raw JSON or an SSE `data:` line. Returns `Ok(None)` for the
/// `[DONE]` terminator.
///
/// # Examples
///
/// ```
/// use chatdroid::api::parse_stream_chunk;
///
/// let chunk = parse_stream_chunk(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#)
///     .unwrap()
///     .unwrap();
/// assert_eq!(chunk.delta_text(), "Hi");
/// assert!(parse_stream_chunk("data: [DONE]").unwrap().is_none());
/// ```
pub fn parse_stream_chunk(frame: &str) -> StoreResult<Option<ChatStreamChunk>> {
    let payload = frame.trim();
    let payload = payload.strip_prefix("data:").map(str::trim).unwrap_or(payload);
    if payload == "[DONE]" {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| ChatDroidError::Payload(format!("Invalid stream chunk: {}", e)))
}

#[derive(Debug)]
enum Outgoing {
    Frame(WsMessage),
    Close,
}

/// Handle to a WebSocket connection driven by a background task
#[derive(Debug)]
pub struct ChatSocket {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    connected: Arc<AtomicBool>,
}

impl ChatSocket {
    /// Start connecting to `url`, attaching a bearer token when given
    ///
    /// Must be called inside a tokio runtime. The first event is always
    /// [`SocketEvent::Connecting`]; the stream ends after
    /// [`SocketEvent::Disconnected`] or [`SocketEvent::Error`].
    pub fn connect(url: &str, token: Option<&str>) -> (Self, ReceiverStream<SocketEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_connection(
            url.to_string(),
            token.map(str::to_string),
            event_tx,
            out_rx,
            Arc::clone(&connected),
        ));

        (
            Self {
                outgoing: out_tx,
                connected,
            },
            ReceiverStream::new(event_rx),
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a text frame
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::WebSocket` when the socket is not open.
    pub fn send_text(&self, text: impl Into<String>) -> StoreResult<()> {
        if !self.is_connected() {
            return Err(ChatDroidError::WebSocket("Socket is not connected".to_string()));
        }
        self.outgoing
            .send(Outgoing::Frame(WsMessage::Text(text.into())))
            .map_err(|_| ChatDroidError::WebSocket("Connection task has stopped".to_string()))
    }

    /// Serialize and queue a streaming completion request
    pub fn send_request(&self, request: &ChatStreamRequest) -> StoreResult<()> {
        let json = serde_json::to_string(request)?;
        self.send_text(json)
    }

    /// Close with a normal-closure frame (code 1000)
    pub fn disconnect(&self) {
        tracing::debug!("Disconnecting WebSocket");
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

async fn emit(events: &mpsc::Sender<SocketEvent>, event: SocketEvent) -> bool {
    events.send(event).await.is_ok()
}

async fn run_connection(
    url: String,
    token: Option<String>,
    events: mpsc::Sender<SocketEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    connected: Arc<AtomicBool>,
) {
    if !emit(&events, SocketEvent::Connecting).await {
        return;
    }

    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            let _ = emit(&events, SocketEvent::Error(format!("Invalid WebSocket URL: {}", e))).await;
            return;
        }
    };
    if let Some(token) = token {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(e) => {
                let _ = emit(&events, SocketEvent::Error(format!("Invalid token: {}", e))).await;
                return;
            }
        }
    }

    tracing::debug!("Connecting to WebSocket: {}", url);
    let (mut ws, _) = match tokio_tungstenite::connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!("WebSocket connection to {} failed: {}", url, e);
            let _ = emit(&events, SocketEvent::Error(e.to_string())).await;
            return;
        }
    };

    connected.store(true, Ordering::SeqCst);
    if !emit(&events, SocketEvent::Connected).await {
        connected.store(false, Ordering::SeqCst);
        return;
    }

    loop {
        tokio::select! {
            _ = events.closed() => {
                tracing::debug!("Event stream dropped; closing WebSocket");
                let _ = ws.close(Some(normal_closure())).await;
                break;
            }
            command = outgoing.recv() => {
                match command {
                    Some(Outgoing::Frame(frame)) => {
                        if let Err(e) = ws.send(frame).await {
                            connected.store(false, Ordering::SeqCst);
                            let _ = emit(&events, SocketEvent::Error(e.to_string())).await;
                            return;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        connected.store(false, Ordering::SeqCst);
                        let _ = ws.close(Some(normal_closure())).await;
                        // drain until the peer acknowledges the close
                        let _ = tokio::time::timeout(CLOSE_GRACE, async {
                            while let Some(Ok(_)) = ws.next().await {}
                        })
                        .await;
                        let _ = emit(&events, SocketEvent::Disconnected).await;
                        return;
                    }
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        tracing::trace!("Received message: {}", text);
                        if !emit(&events, SocketEvent::Message(text)).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if !emit(&events, SocketEvent::Message(text)).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::debug!("WebSocket closing: {:?}", frame);
                        connected.store(false, Ordering::SeqCst);
                        let _ = emit(&events, SocketEvent::Disconnected).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        let _ = emit(&events, SocketEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        connected.store(false, Ordering::SeqCst);
                        let _ = emit(&events, SocketEvent::Disconnected).await;
                        return;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
}

fn normal_closure() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "Normal closure".into(),
    }
}
