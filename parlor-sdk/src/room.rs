//! Room client facade: one active room at a time.
//!
//! Composes the cursor pager, the stream session, and the timeline per
//! active room. Switching rooms, like any token change, tears the current
//! stack down completely (session stopped, retry counters discarded,
//! timeline and cursor dropped) and rebuilds it. Every activation claims a
//! fresh generation number; async results arriving for a superseded
//! generation are discarded, so a slow history response can never land in a
//! newer timeline.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::api::ApiClient;
use crate::error::{FetchError, StreamError};
use crate::model::{Message, PageInfo, Room};
use crate::session::{ConnectionState, SessionConfig, StreamSession};
use crate::timeline::{LiveAppend, Timeline};

/// Endpoints and paging defaults for [`RoomClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP API base, e.g. `http://localhost:8080/api`.
    pub api_base: String,
    /// WebSocket base, e.g. `ws://localhost:8080`.
    pub ws_base: String,
    /// History page size, clamped to the service's 1..=100 window.
    pub page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080/api".to_string(),
            ws_base: "ws://localhost:8080".to_string(),
            page_size: 50,
        }
    }
}

/// What the facade reports to the presentation layer.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A live message entered the timeline. `scroll_to_bottom` is true when
    /// the viewport was near the bottom before the append (see
    /// [`RoomClient::set_auto_scroll_intent`]).
    Live { message: Message, scroll_to_bottom: bool },
    /// The stream session changed connection state.
    Connection(ConnectionState),
}

/// Facade over pager, session, and timeline for the active room.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct RoomClient {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    ws_base: String,
    token_rx: watch::Receiver<String>,
    events_tx: mpsc::Sender<RoomEvent>,
    state: Mutex<RoomState>,
}

struct RoomState {
    room_id: Option<i64>,
    generation: u64,
    timeline: Timeline,
    page_info: PageInfo,
    session: Option<StreamSession>,
    older_in_flight: bool,
    auto_scroll_intent: bool,
}

impl RoomState {
    fn new() -> Self {
        Self {
            room_id: None,
            generation: 0,
            timeline: Timeline::new(),
            page_info: PageInfo::default(),
            session: None,
            older_in_flight: false,
            // Matches a freshly rendered view, scrolled to the bottom.
            auto_scroll_intent: true,
        }
    }
}

impl RoomClient {
    /// Build a client around the auth collaborator's token feed.
    ///
    /// A token change is treated exactly like a room change: full teardown
    /// and reactivation of the current room. An empty token tears down
    /// without reconnecting.
    ///
    /// Returns the facade and the event stream for the presentation layer.
    pub fn new(
        config: ClientConfig,
        token_rx: watch::Receiver<String>,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let inner = Arc::new(Inner {
            api: ApiClient::new(config.api_base, config.page_size),
            ws_base: config.ws_base,
            token_rx: token_rx.clone(),
            events_tx,
            state: Mutex::new(RoomState::new()),
        });

        let watcher = Arc::downgrade(&inner);
        let mut token_changes = token_rx;
        tokio::spawn(async move {
            while token_changes.changed().await.is_ok() {
                let Some(inner) = watcher.upgrade() else { break };
                let room_id = inner.state.lock().room_id;
                if let Some(room_id) = room_id {
                    tracing::debug!(room_id, "token changed, rebuilding room state");
                    if let Err(err) = activate(&inner, room_id).await {
                        tracing::warn!(room_id, error = %err, "reactivation after token change failed");
                    }
                }
            }
        });

        (Self { inner }, events_rx)
    }

    /// `GET /rooms` passthrough.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, FetchError> {
        self.inner.api.list_rooms().await
    }

    /// Activate a room: stop the current session, refetch the latest page,
    /// initialize the timeline, and bind a fresh session to the room and
    /// the current token.
    pub async fn switch_room(&self, room_id: i64) -> Result<(), FetchError> {
        activate(&self.inner, room_id).await
    }

    /// Fetch the page older than the current frontier and prepend it.
    ///
    /// Returns `Ok(Some(n))` with the number of messages inserted, or
    /// `Ok(None)` when nothing was fetched: no active room, frontier
    /// exhausted, another `load_older` already in flight, or the result
    /// arrived for a superseded activation.
    pub async fn load_older(&self) -> Result<Option<usize>, FetchError> {
        let (room_id, page_info, generation) = {
            let mut state = self.inner.state.lock();
            let Some(room_id) = state.room_id else {
                return Ok(None);
            };
            if state.older_in_flight || state.page_info.cursor().is_none() {
                return Ok(None);
            }
            state.older_in_flight = true;
            (room_id, state.page_info.clone(), state.generation)
        };

        let fetched = self.inner.api.load_older(room_id, &page_info).await;

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.older_in_flight = false;
        }
        match fetched {
            Ok(Some((items, next))) => {
                if state.generation != generation {
                    tracing::debug!(room_id, "discarding older page for superseded activation");
                    return Ok(None);
                }
                let inserted = state.timeline.prepend_older(items);
                state.page_info = next;
                Ok(Some(inserted))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Snapshot of the ordered timeline, ascending by `(created_at, id)`.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.lock().timeline.messages().to_vec()
    }

    /// Current pagination frontier; gates a "load older" control.
    pub fn page_info(&self) -> PageInfo {
        self.inner.state.lock().page_info.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Presentation-layer input: whether the viewport was within the
    /// near-bottom threshold before the next live append. Gates the
    /// `scroll_to_bottom` flag on [`RoomEvent::Live`].
    pub fn set_auto_scroll_intent(&self, intent: bool) {
        self.inner.state.lock().auto_scroll_intent = intent;
    }

    /// Send one message through the active session.
    pub async fn send(&self, content: &str) -> Result<(), StreamError> {
        let session = self.inner.state.lock().session.clone();
        match session {
            Some(session) => session.send(content).await,
            None => Err(StreamError::NotConnected),
        }
    }

    /// Tear everything down: stop the session, drop the timeline and
    /// cursor, forget the active room. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(session) = state.session.take() {
            session.stop();
        }
        state.room_id = None;
        state.timeline.clear();
        state.page_info = PageInfo::default();
        state.older_in_flight = false;
    }
}

/// One room activation, shared by `switch_room` and the token watcher.
async fn activate(inner: &Arc<Inner>, room_id: i64) -> Result<(), FetchError> {
    let token = inner.token_rx.borrow().clone();

    // Tear the previous activation down and claim the new generation before
    // the first await, so anything still in flight can be recognized as
    // stale afterwards.
    let generation = {
        let mut state = inner.state.lock();
        if let Some(session) = state.session.take() {
            session.stop();
        }
        state.generation += 1;
        state.room_id = Some(room_id);
        state.timeline.clear();
        state.page_info = PageInfo::default();
        state.older_in_flight = false;
        state.generation
    };

    let (items, page_info) = inner.api.load_latest(room_id).await?;

    let mut state = inner.state.lock();
    if state.generation != generation {
        tracing::debug!(room_id, "activation superseded during history fetch");
        return Ok(());
    }
    state.timeline.initialize(items);
    state.page_info = page_info;

    if token.is_empty() {
        tracing::debug!(room_id, "no token, history only, staying offline");
        return Ok(());
    }

    let (session, event_rx) = StreamSession::connect(SessionConfig {
        ws_base: inner.ws_base.clone(),
        room_id,
        token,
    });
    let state_watch = session.state_watch();
    state.session = Some(session);
    drop(state);

    spawn_pump(inner, generation, event_rx, state_watch);
    Ok(())
}

/// Per-activation pump: feeds session events into the timeline and relays
/// connection-state changes. Dies quietly once its generation is
/// superseded.
fn spawn_pump(
    inner: &Arc<Inner>,
    generation: u64,
    mut event_rx: mpsc::Receiver<Message>,
    mut state_watch: watch::Receiver<ConnectionState>,
) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                message = event_rx.recv() => {
                    let Some(message) = message else { break };
                    let Some(inner) = weak.upgrade() else { break };
                    let event = {
                        let mut state = inner.state.lock();
                        if state.generation != generation {
                            break;
                        }
                        let auto_scroll_intent = state.auto_scroll_intent;
                        match state.timeline.append_live(message.clone(), auto_scroll_intent) {
                            LiveAppend::Appended { scroll_to_bottom } => {
                                Some(RoomEvent::Live { message, scroll_to_bottom })
                            }
                            LiveAppend::Duplicate => None,
                        }
                    };
                    if let Some(event) = event {
                        let _ = inner.events_tx.send(event).await;
                    }
                }
                changed = state_watch.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connection = *state_watch.borrow_and_update();
                    let Some(inner) = weak.upgrade() else { break };
                    {
                        let state = inner.state.lock();
                        if state.generation != generation {
                            break;
                        }
                    }
                    let _ = inner.events_tx.send(RoomEvent::Connection(connection)).await;
                    if connection == ConnectionState::Stopped {
                        break;
                    }
                }
            }
        }
    });
}
