//! Infrastructure layer: event store, command dispatch, read models and
//! document numbering.

pub mod command_dispatcher;
pub mod event_store;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod workflow;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched, SharedProjection};
pub use numbering::{DocumentKind, DocumentNumberer};
pub use projections::{ProjectionError, WorkflowProjection};
pub use workflow::Workflow;

#[cfg(test)]
mod integration_tests;
