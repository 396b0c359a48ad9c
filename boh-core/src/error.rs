//! Engine error taxonomy
//!
//! All errors are values returned to the caller. Operations either commit
//! every effect or none; a surfaced error always means zero effect.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::store::StorageError;

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input; never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A deduction would drive quantity-on-hand negative
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: String,
        requested: Decimal,
        available: Decimal,
    },

    /// A status change violates the state machine
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A generated identifier collided; surfaced after one internal retry
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// Commit contention after bounded retries; callers may retry
    #[error("Transient concurrency failure: {0}")]
    TransientConcurrency(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Debug,
        to: impl std::fmt::Debug,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// Whether a caller-level automatic retry is reasonable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientConcurrency(_))
    }
}
