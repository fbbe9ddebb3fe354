//! Error types for cnrs rooms

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the room list store or the notification channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("room at capacity ({capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Errors surfaced to the caller of a room operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Room at capacity with no slot to reuse
    #[error("room {room} is full ({capacity} peers)")]
    RoomFull { room: String, capacity: usize },

    /// Unrecognized request variant
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Store or channel failure; the whole request may be retried
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Payload did not parse into a known request shape
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl SignalError {
    /// Wire code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SignalError::RoomFull { .. } => ErrorCode::RoomFull,
            SignalError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            SignalError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            SignalError::MalformedRequest(_) => ErrorCode::MalformedRequest,
        }
    }

    /// Whether retrying the same request can succeed without outside changes
    pub fn is_transient(&self) -> bool {
        matches!(self, SignalError::StoreUnavailable(_))
    }
}

/// Wire error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RoomFull,
    InvalidOperation,
    StoreUnavailable,
    MalformedRequest,
}

impl ErrorCode {
    /// HTTP status used by the POST endpoint
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::RoomFull => 403,
            ErrorCode::InvalidOperation => 403,
            ErrorCode::MalformedRequest => 400,
            ErrorCode::StoreUnavailable => 503,
        }
    }
}
