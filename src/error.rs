//! # Error Types
//!
//! This module defines error types used throughout the easel library.
//!
//! Malformed input never shows up here: the normalizer recovers it locally
//! with default values. What remains are the failures a caller has to act
//! on (lock lost, storage unavailable, missing targets).

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for easel operations
#[derive(Debug, Error)]
pub enum EaselError {
    /// Another editor holds the document lock
    #[error("Another editor ({holder}) holds this document until {expires_at}")]
    LockConflict {
        holder: String,
        expires_at: DateTime<Utc>,
    },

    /// The session's lock expired or was taken over; editing is disabled
    #[error("Lock lost, editing disabled")]
    LockLost,

    /// The session was closed while the operation was in flight
    #[error("Session closed")]
    SessionClosed,

    /// Document edit rejected
    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    /// Load/save failure (retryable; the in-memory document is kept)
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Preview data could not be fetched
    #[error("Preview provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from document edit operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("series not found: {0}")]
    SeriesNotFound(String),
}

/// Lock state machine rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Held by someone else and not expired. No state change.
    #[error("document {doc_id} is locked by {holder} until {expires_at}")]
    Conflict {
        doc_id: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    /// The token's lock has lapsed (or the document is unlocked).
    #[error("lock on {0} expired")]
    Expired(String),

    /// The lock is currently held by a different holder.
    #[error("lock on {0} is held by another editor")]
    NotHolder(String),
}

impl From<LockError> for EaselError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Conflict {
                holder, expires_at, ..
            } => EaselError::LockConflict { holder, expires_at },
            LockError::Expired(_) | LockError::NotHolder(_) => EaselError::LockLost,
        }
    }
}

/// Persistence adapter failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("lock conflict saving {0}")]
    LockConflict(String),

    #[error("invalid document: {0}")]
    Validation(String),

    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Preview data provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

/// A single series failed to generate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("record {index} ({id}): {message}")]
    InvalidRecord {
        index: usize,
        id: String,
        message: String,
    },
}
