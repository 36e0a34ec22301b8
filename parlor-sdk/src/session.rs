//! Reconnecting WebSocket session for one room.
//!
//! The session owns exactly one live connection at a time and drives it
//! through an explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ...
//!                                   \------------\-----------> Stopped
//! ```
//!
//! Unplanned closes schedule a redial after `min(30s, 1s * 2^retries)`;
//! the retry counter resets on every successful open. `Stopped` is terminal
//! and reachable only through [`StreamSession::stop`] or dropping the
//! handle; once there, no further dial is ever attempted.
//!
//! Inbound traffic is filtered, not validated: only `message.create` frames
//! reach the consumer, and a malformed payload is dropped without touching
//! the connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::StreamError;
use crate::model::{LiveFrame, MESSAGE_CREATE, Message};

/// Service-side limit on message content length, enforced client-side too.
const MAX_CONTENT_CHARS: usize = 2000;

/// Where one session's connection stands. Exactly one session holds this
/// state per active room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: torn down by the caller, no reconnect will follow.
    Stopped,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionInput {
    Dial,
    Opened,
    Closed,
    Stop,
}

/// The single transition function. `Stopped` absorbs everything.
fn transition(state: ConnectionState, input: SessionInput) -> ConnectionState {
    use ConnectionState::*;
    match (state, input) {
        (Stopped, _) => Stopped,
        (_, SessionInput::Stop) => Stopped,
        (_, SessionInput::Dial) => Connecting,
        (_, SessionInput::Opened) => Connected,
        (_, SessionInput::Closed) => Disconnected,
    }
}

/// Delay before the next dial: `min(30s, 1s * 2^retry_count)`.
pub fn backoff_delay(retry_count: u32) -> Duration {
    Duration::from_secs((1u64 << retry_count.min(5)).min(30))
}

/// Everything needed to dial one room's stream.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket base, e.g. `ws://localhost:8080`.
    pub ws_base: String,
    pub room_id: i64,
    /// Access token, non-empty. The facade never builds a session without
    /// one.
    pub token: String,
}

impl SessionConfig {
    fn connect_url(&self) -> String {
        let token = utf8_percent_encode(&self.token, NON_ALPHANUMERIC);
        format!(
            "{}/ws?room_id={}&token={}",
            self.ws_base.trim_end_matches('/'),
            self.room_id,
            token
        )
    }
}

/// Handle to a running stream session.
///
/// Cheap to clone. Dropping every clone stops the session the same way
/// [`StreamSession::stop`] does.
#[derive(Debug, Clone)]
pub struct StreamSession {
    outbound_tx: mpsc::Sender<String>,
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
}

impl StreamSession {
    /// Spawn the supervisor task and hand back the session handle plus the
    /// receiver of admitted `message.create` events.
    pub fn connect(config: SessionConfig) -> (Self, mpsc::Receiver<Message>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_session(config, event_tx, outbound_rx, state_tx, stop_rx));
        (Self { outbound_tx, state_rx, stop_tx }, event_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch on the connection state, for observers that want changes
    /// pushed rather than polled.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Send one message while connected. Content is trimmed; empty or
    /// oversized content is rejected without touching the wire. There is no
    /// queue; callers are expected to disable send while disconnected.
    pub async fn send(&self, content: &str) -> Result<(), StreamError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StreamError::EmptyMessage);
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(StreamError::TooLong);
        }
        if self.state() != ConnectionState::Connected {
            return Err(StreamError::NotConnected);
        }
        self.outbound_tx
            .send(content.to_string())
            .await
            .map_err(|_| StreamError::SessionClosed)
    }

    /// Scoped teardown: close the active connection if any, cancel a
    /// pending reconnect timer, park the session in `Stopped`. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn step(state: &mut ConnectionState, input: SessionInput, state_tx: &watch::Sender<ConnectionState>) {
    *state = transition(*state, input);
    let _ = state_tx.send(*state);
}

/// Supervisor loop: dial, pump, back off, redial, until stopped.
async fn run_session(
    config: SessionConfig,
    event_tx: mpsc::Sender<Message>,
    mut outbound_rx: mpsc::Receiver<String>,
    state_tx: watch::Sender<ConnectionState>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let url = config.connect_url();
    let mut state = ConnectionState::Disconnected;
    let mut retry_count: u32 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }
        step(&mut state, SessionInput::Dial, &state_tx);
        tracing::debug!(room_id = config.room_id, attempt = retry_count, "dialing stream");

        let dialed = tokio::select! {
            result = connect_async(url.as_str()) => Some(result),
            _ = stop_rx.changed() => None,
        };
        let Some(result) = dialed else { break };

        match result {
            Ok((ws, _response)) => {
                retry_count = 0;
                step(&mut state, SessionInput::Opened, &state_tx);
                tracing::debug!(room_id = config.room_id, "stream connected");
                let stopped =
                    drive_connection(ws, &event_tx, &mut outbound_rx, &mut stop_rx).await;
                if stopped {
                    break;
                }
                step(&mut state, SessionInput::Closed, &state_tx);
                tracing::warn!(room_id = config.room_id, "stream closed, will reconnect");
            }
            Err(err) => {
                step(&mut state, SessionInput::Closed, &state_tx);
                tracing::warn!(room_id = config.room_id, error = %err, "stream connect failed");
            }
        }

        let delay = backoff_delay(retry_count);
        retry_count += 1;
        tracing::debug!(
            room_id = config.room_id,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
    }

    step(&mut state, SessionInput::Stop, &state_tx);
    tracing::debug!(room_id = config.room_id, "session stopped");
}

/// Pump one live connection. Returns true when the session should stop for
/// good (caller teardown or consumer gone), false on an unplanned close.
async fn drive_connection(
    ws: Transport,
    event_tx: &mpsc::Sender<Message>,
    outbound_rx: &mut mpsc::Receiver<String>,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return true;
            }
            Some(content) = outbound_rx.recv() => {
                let frame = serde_json::json!({
                    "type": MESSAGE_CREATE,
                    "data": { "content": content },
                });
                if sink.send(WsMessage::Text(frame.to_string())).await.is_err() {
                    return false;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(message) = parse_live_frame(&text) {
                        if event_tx.send(message).await.is_err() {
                            // Consumer dropped its receiver; nothing left to serve.
                            return true;
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return false,
            }
        }
    }
}

/// Admit `message.create` frames, drop everything else silently.
///
/// Parse failures are trace-logged but never surfaced and never fail the
/// connection.
fn parse_live_frame(text: &str) -> Option<Message> {
    let frame: LiveFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::trace!(error = %err, "dropping malformed frame");
            return None;
        }
    };
    if frame.kind != MESSAGE_CREATE {
        tracing::trace!(kind = %frame.kind, "dropping unrecognized frame kind");
        return None;
    }
    match serde_json::from_value(frame.data) {
        Ok(message) => Some(message),
        Err(err) => {
            tracing::trace!(error = %err, "dropping message.create with bad payload");
            None
        }
    }
}
