use thiserror::Error;
use uuid::Uuid;

use crate::booking::BookingStatus;

/// Faults raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transient serialization/lock failure. Safe to retry a bounded number
    /// of times.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// The backend is unreachable or returned an unexpected fault. Fatal to
    /// the request; never committed partially.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A row came back in a shape the domain cannot decode.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

/// Typed failures surfaced to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("seats unavailable: {}", seats.join(", "))]
    SeatConflict { seats: Vec<String> },

    #[error("no valid lease for seats: {}", seats.join(", "))]
    LeaseExpired { seats: Vec<String> },

    #[error("invalid seat claim: {0}")]
    InvalidClaim(String),

    #[error("bus {0} not found")]
    BusNotFound(i64),

    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("insufficient coin balance: have {balance}, need {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
