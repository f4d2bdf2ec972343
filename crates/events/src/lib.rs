//! `stockflow-events`: contracts between workflow events and their readers.

pub mod envelope;
pub mod event;
pub mod projection;

pub use envelope::{EnvelopeMeta, EventEnvelope, StreamPosition};
pub use event::Event;
pub use projection::Projection;
