//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and build query-optimized read
//! models. They are rebuildable from the event store and idempotent: an
//! envelope at or below the per-stream cursor is ignored.

pub mod workflow;

use thiserror::Error;

use crate::event_store::EventStoreError;

pub use workflow::WorkflowProjection;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error(transparent)]
    Store(#[from] EventStoreError),
}
