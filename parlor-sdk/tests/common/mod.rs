//! In-process mock of the chat service: history endpoints plus the live
//! WebSocket hub, with the same pagination semantics as the real thing
//! (newest-first pages, composite `(created_at, id)` cursor, `has_more`
//! from a tail-existence check).

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use parlor_sdk::{ClientConfig, Message};

/// Fixed epoch for deterministic message timestamps.
const TS_BASE: i64 = 1_700_000_000;

fn ts(secs_offset: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(TS_BASE + secs_offset, 0).unwrap()
}

pub struct MockService {
    pub addr: SocketAddr,
    pub hub: Arc<Hub>,
}

pub struct Hub {
    messages: Mutex<Vec<Message>>,
    next_id: AtomicI64,
    live_tx: broadcast::Sender<String>,
    kill_tx: broadcast::Sender<()>,
    /// Currently open WebSocket connections.
    pub connections: AtomicUsize,
    /// Total history requests served.
    pub history_hits: AtomicUsize,
    /// When set, delays responses to cursor (`before_ts`) requests.
    pub older_delay: Mutex<Option<Duration>>,
    /// When set, every history request answers 500.
    pub fail_history: AtomicBool,
    /// Token seen on the most recent WebSocket upgrade.
    pub last_token: Mutex<String>,
}

impl Hub {
    fn new() -> Self {
        let (live_tx, _) = broadcast::channel(64);
        let (kill_tx, _) = broadcast::channel(8);
        Self {
            messages: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            live_tx,
            kill_tx,
            connections: AtomicUsize::new(0),
            history_hits: AtomicUsize::new(0),
            older_delay: Mutex::new(None),
            fail_history: AtomicBool::new(false),
            last_token: Mutex::new(String::new()),
        }
    }

    /// Seed `count` stored messages for a room, one second apart.
    pub fn seed(&self, room_id: i64, count: usize) {
        for _ in 0..count {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.messages.lock().push(Message {
                id,
                room_id,
                user_id: 1,
                content: format!("m{id}"),
                created_at: ts(id),
            });
        }
    }

    /// Seed `count` messages all sharing one timestamp (tie-breaking cases).
    pub fn seed_tied(&self, room_id: i64, count: usize) {
        for _ in 0..count {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.messages.lock().push(Message {
                id,
                room_id,
                user_id: 1,
                content: format!("m{id}"),
                created_at: ts(0),
            });
        }
    }

    /// Store a new message and broadcast it to every live connection, the
    /// way the real hub fans out a create.
    pub fn append_message(&self, room_id: i64, user_id: i64, content: &str) -> Message {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id,
            room_id,
            user_id,
            content: content.to_string(),
            created_at: ts(id),
        };
        self.messages.lock().push(message.clone());
        let _ = self
            .live_tx
            .send(json!({"type": "message.create", "data": message}).to_string());
        message
    }

    /// Push an arbitrary frame to every live connection.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.live_tx.send(frame.to_string());
    }

    /// Force-close every open WebSocket (simulated network drop).
    pub fn kill_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    pub fn stored_count(&self) -> usize {
        self.messages.lock().len()
    }
}

impl MockService {
    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn client_config(&self, page_size: usize) -> ClientConfig {
        ClientConfig {
            api_base: self.api_base(),
            ws_base: self.ws_base(),
            page_size,
        }
    }
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub async fn start() -> MockService {
    init_tracing();
    let hub = Arc::new(Hub::new());
    let app = Router::new()
        .route("/api/rooms", get(rooms))
        .route("/api/rooms/{id}/messages", get(history))
        .route("/ws", get(ws_upgrade))
        .with_state(hub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockService { addr, hub }
}

async fn rooms(State(_hub): State<Arc<Hub>>) -> Json<serde_json::Value> {
    Json(json!([
        {"id": 1, "name": "general", "is_public": true},
        {"id": 2, "name": "random", "is_public": true},
    ]))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    before_ts: Option<String>,
    before_id: Option<i64>,
}

async fn history(
    Path(room_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
    State(hub): State<Arc<Hub>>,
) -> Response {
    hub.history_hits.fetch_add(1, Ordering::SeqCst);
    if hub.fail_history.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let cursor = match (query.before_ts.as_deref(), query.before_id) {
        (Some(raw), Some(id)) => {
            let delay = *hub.older_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let Ok(before_ts) = raw.parse::<DateTime<Utc>>() else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            Some((before_ts, id))
        }
        (None, None) => None,
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let mut newest_first: Vec<Message> = hub
        .messages
        .lock()
        .iter()
        .filter(|m| m.room_id == room_id)
        .cloned()
        .collect();
    newest_first.sort_by_key(|m| std::cmp::Reverse(m.sort_key()));
    if let Some(frontier) = cursor {
        newest_first.retain(|m| m.sort_key() < frontier);
    }

    let has_tail = newest_first.len() > limit;
    let items: Vec<Message> = newest_first.into_iter().take(limit).collect();
    let page_info = if items.len() == limit {
        let last = items.last().unwrap();
        json!({
            "next_before_ts": last.created_at.to_rfc3339(),
            "next_before_id": last.id,
            "has_more": has_tail,
        })
    } else {
        json!({"has_more": false})
    };
    Json(json!({"items": items, "page_info": page_info})).into_response()
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(hub): State<Arc<Hub>>,
) -> Response {
    let token = params.get("token").cloned().unwrap_or_default();
    if token.is_empty() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let room_id: i64 = params
        .get("room_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    *hub.last_token.lock() = token;
    ws.on_upgrade(move |socket| client_loop(socket, hub, room_id))
}

async fn client_loop(mut socket: WebSocket, hub: Arc<Hub>, room_id: i64) {
    hub.connections.fetch_add(1, Ordering::SeqCst);
    let mut live_rx = hub.live_tx.subscribe();
    let mut kill_rx = hub.kill_tx.subscribe();
    loop {
        tokio::select! {
            frame = live_rx.recv() => {
                let Ok(frame) = frame else { break };
                if socket.send(WsFrame::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            _ = kill_rx.recv() => break,
            inbound = socket.recv() => match inbound {
                Some(Ok(WsFrame::Text(text))) => handle_client_send(&hub, room_id, text.as_str()),
                Some(Ok(_)) => {}
                _ => break,
            }
        }
    }
    hub.connections.fetch_sub(1, Ordering::SeqCst);
}

fn handle_client_send(hub: &Hub, room_id: i64, text: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if value["type"] != "message.create" {
        return;
    }
    let Some(content) = value["data"]["content"].as_str() else {
        return;
    };
    hub.append_message(room_id, 9, content);
}
