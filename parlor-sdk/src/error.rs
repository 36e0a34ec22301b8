//! Error taxonomy at the SDK's public seams.
//!
//! Nothing here is fatal. History failures leave the caller's state
//! unchanged and can be retried by user action. Connection drops are not
//! errors at all; they feed the reconnect state machine in
//! [`crate::session`].

use thiserror::Error;

/// A history or room-list request failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, body read, JSON decode).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a non-2xx status.
    #[error("server returned {status}")]
    Status { status: reqwest::StatusCode },
}

/// An outbound send was rejected before touching the wire.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The session is not currently connected; the SDK does not queue.
    #[error("not connected")]
    NotConnected,
    /// Content was empty after trimming.
    #[error("message content is empty")]
    EmptyMessage,
    /// Content exceeds the service's 2000-character limit.
    #[error("message content exceeds 2000 characters")]
    TooLong,
    /// The session task is gone (stopped or dropped).
    #[error("session is stopped")]
    SessionClosed,
}
