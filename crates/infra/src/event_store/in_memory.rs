use std::collections::BTreeMap;
use std::sync::RwLock;

use stockflow_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Process-local event store backing the API.
///
/// Streams are keyed in a `BTreeMap`; aggregate ids are UUIDv7, so replays
/// by type visit documents in creation order.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<BTreeMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents with at least one event.
    pub fn stream_count(&self) -> usize {
        self.streams.read().map(|s| s.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> EventStoreError {
    EventStoreError::Unavailable("stream lock poisoned".to_string())
}

/// One document, one type, per batch.
fn single_stream(events: &[UncommittedEvent]) -> Result<(AggregateId, &str), EventStoreError> {
    let first = &events[0];
    for (idx, e) in events.iter().enumerate().skip(1) {
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {idx} targets document {} instead of {}",
                e.aggregate_id, first.aggregate_id
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {idx} is a '{}' event in a '{}' batch",
                e.aggregate_type, first.aggregate_type
            )));
        }
    }
    Ok((first.aggregate_id, first.aggregate_type.as_str()))
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (aggregate_id, aggregate_type) = single_stream(&events)?;
        let aggregate_type = aggregate_type.to_string();

        let mut streams = self.streams.write().map_err(poisoned)?;
        let stream = streams.entry(aggregate_id).or_default();

        let current = stream.len() as u64;
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "document {aggregate_id}: expected {expected_version:?}, stream has {current} events"
            )));
        }
        if let Some(head) = stream.first() {
            if head.aggregate_type != aggregate_type {
                return Err(EventStoreError::WrongStreamType {
                    stream: head.aggregate_type.clone(),
                    attempted: aggregate_type,
                });
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, seq)| e.commit(seq))
            .collect();
        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams
            .values()
            .filter(|s| s.first().is_some_and(|e| e.aggregate_type == aggregate_type))
            .flatten()
            .cloned()
            .collect())
    }
}
