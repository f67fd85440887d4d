//! Domain error model.
//!
//! One taxonomy across the core: validation errors (bad input shape, rejected
//! before any lock), invariant errors (rejected after validation, no mutation
//! applied), contention errors (retryable), and reference errors (caller must
//! resolve upstream). Every failure path leaves stock state untouched.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Invariant variants carry the actionable numbers an operator needs to
/// resolve the situation physically ("only 4 available, 5 requested"), not
/// just a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed or empty input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. idempotency key reuse with a new payload).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A withdrawal would drive a stock balance negative.
    #[error("insufficient stock of {product} at {location}: only {available} available, {requested} requested")]
    InsufficientStock {
        location: String,
        product: String,
        available: i64,
        requested: i64,
    },

    /// A deposit would exceed a location's or zone's unit capacity.
    #[error("capacity exceeded at {location}: capacity {capacity}, occupied {occupied}, incoming {incoming}")]
    CapacityExceeded {
        location: String,
        capacity: i64,
        occupied: i64,
        incoming: i64,
    },

    /// A pick would exceed the task's requested quantity.
    #[error("over-pick on task {task}: requested {requested}, already picked {picked}, attempted {attempted}")]
    OverPick {
        task: String,
        requested: i64,
        picked: i64,
        attempted: i64,
    },

    /// The order reached a terminal state and accepts no further line events.
    #[error("order closed: {0}")]
    OrderClosed(String),

    /// The location's derived status forbids the operation
    /// (occupied/reserved for `reserve`, blocked for receipts).
    #[error("location {location} unavailable: status {status}")]
    LocationUnavailable { location: String, status: String },

    /// A per-triple lock could not be acquired within the bounded wait.
    /// Retryable by the caller.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// A master-data reference could not be resolved.
    #[error("unknown {kind} reference: {id}")]
    UnknownReference { kind: &'static str, id: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn order_closed(msg: impl Into<String>) -> Self {
        Self::OrderClosed(msg.into())
    }

    pub fn lock_timeout(msg: impl Into<String>) -> Self {
        Self::LockTimeout(msg.into())
    }

    pub fn unknown_reference(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownReference {
            kind,
            id: id.into(),
        }
    }

    /// Contention errors are safe to retry; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_the_numbers() {
        let err = DomainError::InsufficientStock {
            location: "A-01-01".to_string(),
            product: "PROD001".to_string(),
            available: 4,
            requested: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("only 4 available"));
        assert!(msg.contains("5 requested"));
    }

    #[test]
    fn only_lock_timeout_is_retryable() {
        assert!(DomainError::lock_timeout("triple busy").is_retryable());
        assert!(!DomainError::not_found().is_retryable());
        assert!(!DomainError::conflict("x").is_retryable());
    }
}
