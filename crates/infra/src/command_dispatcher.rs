//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Take the per-aggregate stream lock
//!   ↓
//! 2. Load events from store and rehydrate the aggregate
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Apply the events' ledger ops as one ledger transaction
//!   ↓
//! 5. Append events (optimistic concurrency check); on failure, compensate
//!   ↓
//! 6. Fold committed envelopes into the registered projections
//! ```
//!
//! Ledger contention and stale stream versions are retried from step 2 up
//! to the configured number of attempts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockflow_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use stockflow_events::Projection;
use stockflow_ledger::{
    InventoryLedger, LedgerEffect, LedgerError, LedgerOp, StockMovement, compensation_for,
};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::projections::ProjectionError;
use crate::workflow::Workflow;

/// Default number of attempts per command.
pub const DEFAULT_ATTEMPTS: u32 = 3;

pub type SharedProjection = Arc<dyn Projection<JsonValue, Error = ProjectionError>>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Guard or validation failure decided by the aggregate.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The ledger rejected the batch.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Contention or stale versions outlived the retry limit.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("dispatcher lock poisoned")]
    Poisoned,
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Ledger(e) => e.is_retryable(),
            DispatchError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The user-facing domain error, if this is not an infrastructure fault.
    pub fn domain_error(&self) -> Option<DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e.clone()),
            DispatchError::Ledger(LedgerError::Poisoned) => None,
            DispatchError::Ledger(e) => Some(e.clone().into()),
            DispatchError::Exhausted { .. } => Some(DomainError::conflict(self.to_string())),
            DispatchError::Store(EventStoreError::Concurrency(msg)) => {
                Some(DomainError::conflict(msg.clone()))
            }
            _ => None,
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the new events.
    pub state: A,
    pub events: Vec<A::Event>,
    pub stored: Vec<StoredEvent>,
    /// Ledger movements committed with the events.
    pub movements: Vec<StockMovement>,
}

/// Reusable command execution engine for the workflow aggregates.
pub struct CommandDispatcher<S> {
    store: S,
    ledger: Arc<InventoryLedger>,
    projections: Vec<SharedProjection>,
    streams: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
    attempts: u32,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S, ledger: Arc<InventoryLedger>) -> Self {
        Self {
            store,
            ledger,
            projections: Vec::new(),
            streams: Mutex::new(HashMap::new()),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Total attempts per command, including the first (at least 1).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Register a projection updated synchronously after every append.
    pub fn with_projection(mut self, projection: SharedProjection) -> Self {
        self.projections.push(projection);
        self
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn stream_lock(&self, aggregate_id: AggregateId) -> Result<Arc<Mutex<()>>, DispatchError> {
        let mut streams = self.streams.lock().map_err(|_| DispatchError::Poisoned)?;
        Ok(streams.entry(aggregate_id).or_default().clone())
    }

    /// Forget the lock of a stream no other command is waiting on.
    fn release_stream(&self, aggregate_id: AggregateId, stream: Arc<Mutex<()>>) {
        let Ok(mut streams) = self.streams.lock() else {
            return;
        };
        let idle = streams
            .get(&aggregate_id)
            .is_some_and(|held| Arc::ptr_eq(held, &stream) && Arc::strong_count(&stream) == 2);
        if idle {
            streams.remove(&aggregate_id);
        }
    }

    #[cfg(test)]
    fn tracked_streams(&self) -> usize {
        self.streams.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// Commands on the same aggregate are serialized; the aggregate re-checks
    /// its guards against freshly loaded state on every attempt.
    #[tracing::instrument(
        skip(self, command),
        fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = %aggregate_id)
    )]
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Workflow,
    {
        let stream = self.stream_lock(aggregate_id)?;
        let outcome = match stream.lock() {
            Ok(_serialized) => self.dispatch_serialized::<A>(aggregate_id, &command),
            Err(_) => Err(DispatchError::Poisoned),
        };
        self.release_stream(aggregate_id, stream);
        outcome
    }

    fn dispatch_serialized<A>(
        &self,
        aggregate_id: AggregateId,
        command: &A::Command,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Workflow,
    {
        let mut attempt = 1;
        loop {
            match self.attempt::<A>(aggregate_id, command) {
                Ok(done) => {
                    for stored in &done.stored {
                        tracing::info!(
                            aggregate_type = A::AGGREGATE_TYPE,
                            aggregate_id = %aggregate_id,
                            event_type = %stored.event_type,
                            sequence_number = stored.sequence_number,
                            "event committed"
                        );
                    }
                    self.publish(&done.stored);
                    return Ok(done);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= self.attempts {
                        return Err(DispatchError::Exhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    tracing::warn!(attempt, error = %err, "retrying command");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Committed events of one aggregate, oldest first.
    pub fn history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, DispatchError> {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        Ok(history)
    }

    /// Rehydrate an aggregate from its stream. `None` if it is not live.
    pub fn load<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DispatchError>
    where
        A: Workflow,
    {
        let history = self.history(aggregate_id)?;
        if !is_stream_of::<A>(&history) {
            return Ok(None);
        }
        let mut aggregate = A::for_id(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate.is_live().then_some(aggregate))
    }

    fn attempt<A>(
        &self,
        aggregate_id: AggregateId,
        command: &A::Command,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Workflow,
    {
        // 1) Load + rehydrate
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        if !is_stream_of::<A>(&history) {
            let what = format!("{} {aggregate_id}", A::AGGREGATE_TYPE);
            return Err(DomainError::not_found(what).into());
        }
        let mut aggregate = A::for_id(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        let expected = ExpectedVersion::after(aggregate.version());

        // 2) Decide events (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                state: aggregate,
                events: vec![],
                stored: vec![],
                movements: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        // 3) Ledger effects, all-or-nothing
        let ops: Vec<LedgerOp> = decided.iter().flat_map(|ev| ev.ledger_ops()).collect();
        let reference = decided
            .iter()
            .find_map(|ev| ev.document_number())
            .map(str::to_string)
            .unwrap_or_else(|| aggregate_id.to_string());
        let movements = if ops.is_empty() {
            vec![]
        } else {
            self.ledger.apply(&reference, &ops)?
        };

        // 4) Persist (append-only, optimistic)
        let stored = match self.store.append(uncommitted, expected) {
            Ok(stored) => stored,
            Err(err) => {
                self.compensate(&reference, &ops);
                return Err(err.into());
            }
        };

        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            state: aggregate,
            events: decided,
            stored,
            movements,
        })
    }

    /// Undo a committed ledger batch whose events were not persisted.
    fn compensate(&self, reference: &str, ops: &[LedgerOp]) {
        if ops.is_empty() {
            return;
        }
        let inverse = compensation_for(ops);
        for attempt in 1..=self.attempts {
            match self.ledger.apply(reference, &inverse) {
                Ok(_) => {
                    tracing::warn!(reference, ops = ops.len(), "ledger batch compensated");
                    return;
                }
                Err(err) if err.is_retryable() && attempt < self.attempts => continue,
                Err(err) => {
                    tracing::error!(reference, error = %err, "ledger compensation failed");
                    return;
                }
            }
        }
    }

    fn publish(&self, stored: &[StoredEvent]) {
        for e in stored {
            let envelope = e.to_envelope();
            for projection in &self.projections {
                if let Err(err) = projection.apply_envelope(&envelope) {
                    // Read models are rebuildable; the command already succeeded.
                    tracing::error!(
                        projection = projection.aggregate_type(),
                        sequence_number = e.sequence_number,
                        error = %err,
                        "projection update failed"
                    );
                }
            }
        }
    }
}

/// Empty streams belong to nobody yet; otherwise the first event decides.
fn is_stream_of<A: Workflow>(stream: &[StoredEvent]) -> bool {
    stream
        .first()
        .is_none_or(|e| e.aggregate_type == A::AGGREGATE_TYPE)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    for (applied, e) in (0u64..).zip(stream) {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::CorruptStream(format!(
                "event {} of {aggregate_id} belongs to {}",
                e.event_id, e.aggregate_id
            ))));
        }
        if !e.position().follows(applied) {
            return Err(DispatchError::Store(EventStoreError::CorruptStream(format!(
                "{aggregate_id}: sequence {} after {applied} events",
                e.sequence_number
            ))));
        }
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Workflow,
{
    for stored in history {
        let ev: <A as Aggregate>::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockflow_core::WarehouseId;
    use stockflow_counting::{CountPlan, CountPlanCommand, CountPlanId, StartCount};
    use stockflow_transfer::{
        ConfirmTransferOrder, CreateTransferOrder, TransferLineInput, TransferOrder,
        TransferOrderCommand, TransferOrderId,
    };

    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore> {
        CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InventoryLedger::new()))
    }

    #[test]
    fn commands_on_unknown_aggregates_are_not_found() {
        let dispatcher = dispatcher();
        let id = AggregateId::new();
        let err = dispatcher
            .dispatch::<TransferOrder>(
                id,
                TransferOrderCommand::Confirm(ConfirmTransferOrder {
                    order_id: TransferOrderId::new(id),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        match err.domain_error() {
            Some(DomainError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }
        assert!(dispatcher.history(id).unwrap().is_empty());
        assert!(dispatcher.load::<TransferOrder>(id).unwrap().is_none());
    }

    #[test]
    fn exhausted_retries_surface_as_concurrency_conflict() {
        let err = DispatchError::Exhausted {
            attempts: 3,
            last: "lock contention".to_string(),
        };
        assert_eq!(err.domain_error().map(|e| e.code()), Some("concurrency_conflict"));

        let ledger_err = DispatchError::Ledger(LedgerError::InsufficientAvailable {
            key: stockflow_ledger::StockKey::new(
                WarehouseId::new(),
                stockflow_core::ItemId::new(),
                None,
            ),
            requested: 5,
            available: 0,
        });
        assert!(!ledger_err.is_retryable());
        assert_eq!(
            ledger_err.domain_error().map(|e| e.code()),
            Some("insufficient_available")
        );
    }

    #[test]
    fn streams_of_another_workflow_are_not_found() {
        let dispatcher = dispatcher();
        let id = AggregateId::new();
        dispatcher
            .dispatch::<TransferOrder>(
                id,
                TransferOrderCommand::Create(CreateTransferOrder {
                    order_id: TransferOrderId::new(id),
                    transfer_number: "TR-1".to_string(),
                    from_warehouse_id: WarehouseId::new(),
                    to_warehouse_id: WarehouseId::new(),
                    remark: None,
                    lines: vec![TransferLineInput {
                        item_id: stockflow_core::ItemId::new(),
                        batch_number: None,
                        transfer_quantity: 1,
                        unit: "pcs".to_string(),
                        from_location: None,
                        to_location: None,
                    }],
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();

        let err = dispatcher
            .dispatch::<CountPlan>(
                id,
                CountPlanCommand::Start(StartCount {
                    plan_id: CountPlanId::new(id),
                    snapshot: vec![],
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        assert_eq!(err.domain_error().map(|e| e.code()), Some("not_found"));
        assert!(dispatcher.load::<CountPlan>(id).unwrap().is_none());
        assert!(dispatcher.load::<TransferOrder>(id).unwrap().is_some());
        assert_eq!(dispatcher.tracked_streams(), 0);
    }

    #[test]
    fn stream_locks_are_released_after_dispatch() {
        let dispatcher = dispatcher();
        for _ in 0..50 {
            let id = AggregateId::new();
            let _ = dispatcher.dispatch::<TransferOrder>(
                id,
                TransferOrderCommand::Confirm(ConfirmTransferOrder {
                    order_id: TransferOrderId::new(id),
                    occurred_at: Utc::now(),
                }),
            );
        }
        assert_eq!(dispatcher.tracked_streams(), 0);

        let id = AggregateId::new();
        let held = dispatcher.stream_lock(id).unwrap();
        let waiting = dispatcher.stream_lock(id).unwrap();
        dispatcher.release_stream(id, waiting);
        assert_eq!(dispatcher.tracked_streams(), 1);
        dispatcher.release_stream(id, held);
        assert_eq!(dispatcher.tracked_streams(), 0);
    }

    #[test]
    fn poisoned_ledger_is_an_internal_failure() {
        let err = DispatchError::Ledger(LedgerError::Poisoned);
        assert!(err.domain_error().is_none());
        assert!(!err.is_retryable());
    }

    #[test]
    fn attempts_are_at_least_one() {
        assert_eq!(dispatcher().with_attempts(0).attempts, 1);
    }
}
