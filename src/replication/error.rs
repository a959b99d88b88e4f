//! Replication store error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// What went wrong talking to the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum StoreErrorKind {
    /// The store could not be reached or dropped the connection.
    #[display("store unavailable: {}", _0)]
    Unavailable(String),
    /// A channel payload that is not a valid event.
    #[display("malformed event on {}: {}", channel, reason)]
    MalformedEvent {
        /// Channel the payload arrived on.
        channel: String,
        /// Parser message.
        reason: String,
    },
    /// A value could not be encoded or decoded.
    #[display("serialization failed: {}", _0)]
    Serialization(String),
}

/// Replication store error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error: {} at {}:{}", kind, file, line)]
pub struct StoreError {
    /// Error kind.
    pub kind: StoreErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new store error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: StoreErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// The store could not be reached.
    #[track_caller]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable(message.into()))
    }

    /// A payload on `channel` failed to parse.
    #[track_caller]
    pub fn malformed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::MalformedEvent {
            channel: channel.into(),
            reason: reason.into(),
        })
    }
}

impl From<redis::RedisError> for StoreError {
    #[track_caller]
    fn from(err: redis::RedisError) -> Self {
        Self::unavailable(format!("Redis error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(StoreErrorKind::Serialization(err.to_string()))
    }
}
