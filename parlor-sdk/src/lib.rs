//! Client SDK for parlor room-chat servers.
//!
//! The SDK talks to a room-based chat service over two transports: plain
//! HTTP for room listing and history pagination, and a WebSocket for the
//! live message stream. It is UI-agnostic: the presentation layer gets an
//! ordered, deduplicated timeline and a stream of [`room::RoomEvent`]s and
//! decides how to render them.
//!
//! Four pieces:
//!
//! - [`api::ApiClient`]: cursor-paged history fetches. The pagination key
//!   is the composite `(created_at, id)` so pages stay correct when several
//!   messages share a timestamp.
//! - [`session::StreamSession`]: one live connection per room, reconnecting
//!   with capped exponential backoff (1s, 2s, 4s, ... 30s).
//! - [`timeline::Timeline`]: merges history pages and live events into one
//!   ascending sequence with unique message ids.
//! - [`room::RoomClient`]: composes the three per active room and tears the
//!   whole stack down when the room or the access token changes.
//!
//! Authentication is someone else's job: the SDK consumes a token string
//! through a [`tokio::sync::watch`] channel and never attempts a connection
//! while the token is empty.

pub mod api;
pub mod error;
pub mod model;
pub mod room;
pub mod session;
pub mod timeline;

pub use error::{FetchError, StreamError};
pub use model::{Message, PageInfo, Room};
pub use room::{ClientConfig, RoomClient, RoomEvent};
pub use session::{ConnectionState, SessionConfig, StreamSession};
pub use timeline::{LiveAppend, Timeline};
