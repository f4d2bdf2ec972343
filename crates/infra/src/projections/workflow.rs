use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;

use stockflow_core::{Aggregate, AggregateId};
use stockflow_events::{EventEnvelope, Projection};

use crate::event_store::EventStore;
use crate::projections::ProjectionError;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::workflow::Workflow;

/// Read model of every live document of one workflow type.
///
/// Each committed envelope is folded into a snapshot of the document with
/// the aggregate's own `apply`, so the view always agrees with what the
/// dispatcher would rehydrate. Deleted documents leave the store.
#[derive(Debug)]
pub struct WorkflowProjection<A, S = Arc<InMemoryReadStore<AggregateId, A>>> {
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    _workflow: PhantomData<fn() -> A>,
}

impl<A> WorkflowProjection<A>
where
    A: Workflow,
{
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryReadStore::new()))
    }
}

impl<A, S> WorkflowProjection<A, S>
where
    A: Workflow,
    S: ReadStore<AggregateId, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            _workflow: PhantomData,
        }
    }

    pub fn get(&self, id: AggregateId) -> Option<A> {
        self.store.get(&id)
    }

    /// Live documents, oldest first.
    pub fn list(&self) -> Vec<A> {
        self.store.list()
    }

    /// Clear the read model and replay every stream of this workflow type.
    pub fn rebuild<E: EventStore>(&self, events: &E) -> Result<usize, ProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let stored = events.load_by_type(A::AGGREGATE_TYPE)?;
        for e in &stored {
            self.apply_envelope(&e.to_envelope())?;
        }
        tracing::info!(
            aggregate_type = A::AGGREGATE_TYPE,
            events = stored.len(),
            "read model rebuilt"
        );
        Ok(stored.len())
    }

    fn cursor(&self, id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn advance(&self, id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(id, seq);
        }
    }
}

impl<A, S> Projection<JsonValue> for WorkflowProjection<A, S>
where
    A: Workflow,
    S: ReadStore<AggregateId, A>,
{
    type Error = ProjectionError;

    fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::AGGREGATE_TYPE {
            return Ok(());
        }

        let position = envelope.position();
        let id = position.aggregate_id;
        let last = self.cursor(id);

        if position.sequence_number > 0 && position.is_replay_of(last) {
            return Ok(());
        }
        if !position.follows(last) {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: position.sequence_number,
            });
        }

        let decoded = envelope
            .try_map(|raw| serde_json::from_value::<<A as Aggregate>::Event>(raw.clone()))
            .map_err(|e| ProjectionError::Deserialize(format!("{}: {e}", envelope.event_type())))?;

        let mut snapshot = self.store.get(&id).unwrap_or_else(|| A::for_id(id));
        snapshot.apply(decoded.payload());
        if snapshot.is_live() {
            self.store.upsert(id, snapshot);
        } else {
            self.store.remove(&id);
        }

        self.advance(id, position.sequence_number);
        Ok(())
    }
}
