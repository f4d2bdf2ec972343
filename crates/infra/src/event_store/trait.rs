use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockflow_core::{AggregateId, ExpectedVersion};
use stockflow_events::{EnvelopeMeta, EventEnvelope, StreamPosition};

/// A decided event on its way into a document stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed workflow event for the stream of `aggregate_id`.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: stockflow_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::Serialization(format!("{}: {e}", event.event_type()))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    /// Fix the event at `sequence_number` of its stream.
    pub fn commit(self, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number,
            event_type: self.event_type,
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            payload: self.payload,
        }
    }
}

/// A committed event. The stream of a document is its audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn position(&self) -> StreamPosition {
        StreamPosition::new(self.aggregate_id, self.sequence_number)
    }

    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        let meta = EnvelopeMeta {
            event_id: self.event_id,
            aggregate_type: self.aggregate_type.clone(),
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            occurred_at: self.occurred_at,
        };
        EventEnvelope::new(self.position(), meta, self.payload.clone())
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer appended since the stream was read.
    #[error("stream moved on: {0}")]
    Concurrency(String),

    #[error("stream belongs to '{stream}', not '{attempted}'")]
    WrongStreamType { stream: String, attempted: String },

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// A loaded stream broke the sequence rules.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error("event payload could not be serialized: {0}")]
    Serialization(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

impl EventStoreError {
    /// Whether reloading the stream and deciding again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventStoreError::Concurrency(_))
    }
}

/// Append-only storage of document streams.
///
/// `append` commits a batch for one document atomically, numbering it from
/// the current stream length + 1, and fails with `Concurrency` when the
/// expectation is stale. Loading a document that never existed yields an
/// empty stream.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// All streams of one document type, each in sequence order. Read
    /// models replay this on rebuild.
    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_by_type(aggregate_type)
    }
}
