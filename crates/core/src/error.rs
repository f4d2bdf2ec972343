//! Errors a workflow command can be rejected with.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Every variant is deterministic and user-displayable: workflows reject a
/// command with one of these before any side effect is applied. Storage and
/// transport failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or invalid fields, zero/negative quantities.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not legal in the entity's current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The ledger cannot satisfy a reservation, transfer-out or adjustment.
    #[error("insufficient available quantity: {0}")]
    InsufficientAvailable(String),

    /// A count plan's variances were already applied to the ledger.
    #[error("count plan already adjusted")]
    AlreadyAdjusted,

    /// A count plan still has records without an actual quantity.
    #[error("count incomplete: {pending} record(s) still pending")]
    IncompleteCount { pending: usize },

    /// A path or body id is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Unknown document, or a stream of another document type.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lock contention or a stale version that outlived the retry limit.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientAvailable(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    /// Stable machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidTransition(_) => "invalid_transition",
            DomainError::InsufficientAvailable(_) => "insufficient_available",
            DomainError::AlreadyAdjusted => "already_adjusted",
            DomainError::IncompleteCount { .. } => "incomplete_count",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::ConcurrencyConflict(_) => "concurrency_conflict",
        }
    }
}
