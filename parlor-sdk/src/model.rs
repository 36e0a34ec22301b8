//! Wire types shared by the history API and the live stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat room as returned by `GET /rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

/// One chat message. Immutable once created: the timeline only ever
/// prepends or appends, never updates in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(default)]
    pub room_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Timeline ordering key: ascending by timestamp, ties broken by id.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

/// Pagination frontier toward the past.
///
/// The cursor identifies the oldest message already loaded; the next page is
/// everything strictly older than `(next_before_ts, next_before_id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub next_before_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_before_id: Option<i64>,
    #[serde(default)]
    pub has_more: bool,
}

impl PageInfo {
    /// The `(timestamp, id)` frontier, or `None` when no further request
    /// should be made.
    ///
    /// The service can emit a filled cursor alongside `has_more: false`
    /// (last page landed exactly on the limit) or, in principle, a half-set
    /// cursor. Both normalize to "exhausted" here so callers only ever see
    /// a frontier that is actually worth fetching.
    pub fn cursor(&self) -> Option<(DateTime<Utc>, i64)> {
        if !self.has_more {
            return None;
        }
        match (self.next_before_ts, self.next_before_id) {
            (Some(ts), Some(id)) => Some((ts, id)),
            _ => None,
        }
    }
}

/// Response shape of the history endpoint. `items` arrive newest-first on
/// the wire; [`crate::api::ApiClient`] reverses them before anyone else sees
/// them.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub items: Vec<Message>,
    #[serde(default)]
    pub page_info: PageInfo,
}

/// Inbound realtime envelope: `{"type": ..., "data": ...}`.
///
/// Only `type == "message.create"` is ever admitted; everything else is
/// dropped by the session without failing the connection.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Frame type carrying a new message, both inbound and outbound.
pub const MESSAGE_CREATE: &str = "message.create";
