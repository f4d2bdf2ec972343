//! Integration tests for the full pipeline.
//!
//! Command → Aggregate → Ledger transaction → EventStore → Projection
//!
//! Verifies:
//! - Workflow transitions move ledger quantities exactly once
//! - Rejected transitions leave the ledger untouched
//! - Append failures are compensated and retried

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal_macros::dec;

use stockflow_core::{AggregateId, EmployeeId, ExpectedVersion, ItemId, LocalKey, RowKey, WarehouseId};
use stockflow_counting::{
    ApplyAdjustments, CompleteCount, CountPlan, CountPlanCommand, CountPlanId, CountPlanStatus,
    CountScope, CreateCountPlan, FillPolicy, RecordActual, SnapshotRow, StartCount,
};
use stockflow_inbound::{
    ApprovalDecision, ConfirmInboundOrder, CreateInboundOrder, ExecuteInboundOrder, InboundOrder,
    InboundOrderCommand, InboundOrderId, InboundOrderStatus, LineInput, ReviewInboundOrder,
};
use stockflow_ledger::{InventoryFilter, InventoryLedger, MovementFilter, MovementKind, StockKey};
use stockflow_transfer::{
    CancelTransferOrder, ConfirmTransferOrder, CreateTransferOrder, ExecuteTransferOrder,
    ReceiveTransferOrder, TransferLineInput, TransferOrder, TransferOrderCommand, TransferOrderId,
    TransferOrderStatus,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
use crate::projections::WorkflowProjection;

struct Harness<S = InMemoryEventStore> {
    dispatcher: CommandDispatcher<S>,
    ledger: Arc<InventoryLedger>,
    inbound: Arc<WorkflowProjection<InboundOrder>>,
    transfers: Arc<WorkflowProjection<TransferOrder>>,
    counts: Arc<WorkflowProjection<CountPlan>>,
}

fn setup() -> Harness {
    setup_with(InMemoryEventStore::new())
}

fn setup_with<S: EventStore>(store: S) -> Harness<S> {
    let ledger = Arc::new(InventoryLedger::new());
    let inbound = Arc::new(WorkflowProjection::<InboundOrder>::in_memory());
    let transfers = Arc::new(WorkflowProjection::<TransferOrder>::in_memory());
    let counts = Arc::new(WorkflowProjection::<CountPlan>::in_memory());
    let dispatcher = CommandDispatcher::new(store, ledger.clone())
        .with_projection(inbound.clone())
        .with_projection(transfers.clone())
        .with_projection(counts.clone());
    Harness {
        dispatcher,
        ledger,
        inbound,
        transfers,
        counts,
    }
}

/// Event store whose next `failures` appends fail with `error`.
struct FaultyStore {
    inner: InMemoryEventStore,
    failures: Mutex<u32>,
    error: fn() -> EventStoreError,
}

impl FaultyStore {
    fn new(failures: u32, error: fn() -> EventStoreError) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            failures: Mutex::new(failures),
            error,
        }
    }

    fn fail_next(&self, failures: u32) {
        *self.failures.lock().unwrap() = failures;
    }
}

impl EventStore for FaultyStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err((self.error)());
        }
        drop(failures);
        self.inner.append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(aggregate_id)
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_by_type(aggregate_type)
    }
}

fn stale() -> EventStoreError {
    EventStoreError::Concurrency("simulated concurrent writer".to_string())
}

fn offline() -> EventStoreError {
    EventStoreError::Unavailable("simulated outage".to_string())
}

fn current(ledger: &InventoryLedger, key: &StockKey) -> i64 {
    ledger.get(key).ok().flatten().map(|r| r.current_quantity()).unwrap_or(0)
}

fn available(ledger: &InventoryLedger, key: &StockKey) -> i64 {
    ledger.get(key).ok().flatten().map(|r| r.available_quantity()).unwrap_or(0)
}

fn domain_code(err: &DispatchError) -> &'static str {
    err.domain_error().map(|e| e.code()).unwrap_or("infrastructure")
}

// ---- inbound ---------------------------------------------------------------

/// Creates, confirms and approves an inbound order for 100 @ 2.00.
fn approved_inbound<S: EventStore>(
    h: &Harness<S>,
    warehouse: WarehouseId,
    item: ItemId,
) -> InboundOrderId {
    let id = AggregateId::new();
    let order_id = InboundOrderId::new(id);
    h.dispatcher
        .dispatch::<InboundOrder>(
            id,
            InboundOrderCommand::Create(CreateInboundOrder {
                order_id,
                order_number: "IN-20260301-0001".to_string(),
                warehouse_id: warehouse,
                remark: None,
                lines: vec![LineInput {
                    row: RowKey::Local(LocalKey::new("tmp-1").unwrap()),
                    item_id: item,
                    inbound_quantity: 100,
                    unit_cost: dec!(2.00),
                    batch_number: None,
                    location_code: Some("A-01".to_string()),
                    quality_status: None,
                }],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    h.dispatcher
        .dispatch::<InboundOrder>(
            id,
            InboundOrderCommand::Confirm(ConfirmInboundOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    h.dispatcher
        .dispatch::<InboundOrder>(
            id,
            InboundOrderCommand::Review(ReviewInboundOrder {
                order_id,
                decision: ApprovalDecision::Approved,
                reviewer_id: None,
                comment: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    order_id
}

fn execute_inbound<S: EventStore>(
    h: &Harness<S>,
    order_id: InboundOrderId,
) -> Result<(), DispatchError> {
    h.dispatcher
        .dispatch::<InboundOrder>(
            order_id.0,
            InboundOrderCommand::Execute(ExecuteInboundOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .map(|_| ())
}

#[test]
fn executing_an_inbound_order_receives_each_line_once() {
    let h = setup();
    let (w, item) = (WarehouseId::new(), ItemId::new());
    let key = StockKey::new(w, item, None);
    let order_id = approved_inbound(&h, w, item);

    execute_inbound(&h, order_id).unwrap();

    let record = h.ledger.get(&key).unwrap().unwrap();
    assert_eq!(record.current_quantity(), 100);
    assert_eq!(record.unit_cost(), dec!(2.00));
    assert_eq!(record.location_code(), Some("A-01"));

    let err = execute_inbound(&h, order_id).unwrap_err();
    assert_eq!(domain_code(&err), "invalid_transition");
    assert_eq!(current(&h.ledger, &key), 100);

    let receipts = h.ledger.movements(&MovementFilter {
        reference: Some("IN-20260301-0001".to_string()),
        ..MovementFilter::default()
    }).unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].kind, MovementKind::Receive);

    let view = h.inbound.get(order_id.0).unwrap();
    assert_eq!(view.status(), InboundOrderStatus::Completed);
    assert_eq!(h.dispatcher.history(order_id.0).unwrap().len(), 4);
}

#[test]
fn unapproved_inbound_orders_cannot_be_executed() {
    let h = setup();
    let id = AggregateId::new();
    let order_id = InboundOrderId::new(id);
    let (w, item) = (WarehouseId::new(), ItemId::new());
    h.dispatcher
        .dispatch::<InboundOrder>(
            id,
            InboundOrderCommand::Create(CreateInboundOrder {
                order_id,
                order_number: "IN-20260301-0002".to_string(),
                warehouse_id: w,
                remark: None,
                lines: vec![LineInput {
                    row: RowKey::Local(LocalKey::new("tmp-1").unwrap()),
                    item_id: item,
                    inbound_quantity: 5,
                    unit_cost: dec!(1),
                    batch_number: None,
                    location_code: None,
                    quality_status: None,
                }],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    h.dispatcher
        .dispatch::<InboundOrder>(
            id,
            InboundOrderCommand::Confirm(ConfirmInboundOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    let err = execute_inbound(&h, order_id).unwrap_err();
    assert_eq!(domain_code(&err), "invalid_transition");
    assert!(h.ledger.get(&StockKey::new(w, item, None)).unwrap().is_none());
}

// ---- transfer --------------------------------------------------------------

fn create_transfer<S: EventStore>(
    h: &Harness<S>,
    from: WarehouseId,
    to: WarehouseId,
    item: ItemId,
    quantity: i64,
) -> TransferOrderId {
    let id = AggregateId::new();
    let order_id = TransferOrderId::new(id);
    h.dispatcher
        .dispatch::<TransferOrder>(
            id,
            TransferOrderCommand::Create(CreateTransferOrder {
                order_id,
                transfer_number: format!("TR-20260301-{:04}", quantity),
                from_warehouse_id: from,
                to_warehouse_id: to,
                remark: None,
                lines: vec![TransferLineInput {
                    item_id: item,
                    batch_number: None,
                    transfer_quantity: quantity,
                    unit: "pcs".to_string(),
                    from_location: Some("A-01".to_string()),
                    to_location: Some("B-07".to_string()),
                }],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    order_id
}

fn transfer_step<S: EventStore>(
    h: &Harness<S>,
    command: TransferOrderCommand,
    order_id: TransferOrderId,
) -> Result<(), DispatchError> {
    h.dispatcher
        .dispatch::<TransferOrder>(order_id.0, command)
        .map(|_| ())
}

fn confirm(order_id: TransferOrderId) -> TransferOrderCommand {
    TransferOrderCommand::Confirm(ConfirmTransferOrder {
        order_id,
        occurred_at: Utc::now(),
    })
}

fn execute(order_id: TransferOrderId) -> TransferOrderCommand {
    TransferOrderCommand::Execute(ExecuteTransferOrder {
        order_id,
        occurred_at: Utc::now(),
    })
}

fn receive(order_id: TransferOrderId) -> TransferOrderCommand {
    TransferOrderCommand::Receive(ReceiveTransferOrder {
        order_id,
        occurred_at: Utc::now(),
    })
}

fn cancel(order_id: TransferOrderId) -> TransferOrderCommand {
    TransferOrderCommand::Cancel(CancelTransferOrder {
        order_id,
        reason: "customer changed plans".to_string(),
        occurred_at: Utc::now(),
    })
}

#[test]
fn transfer_moves_fifty_units_between_warehouses() {
    let h = setup();
    let (w1, w2, item) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
    let source = StockKey::new(w1, item, None);
    let destination = StockKey::new(w2, item, None);
    h.ledger.receive(&source, 100, dec!(3.50), Some("A-01")).unwrap();

    let order_id = create_transfer(&h, w1, w2, item, 50);

    transfer_step(&h, confirm(order_id), order_id).unwrap();
    let src = h.ledger.get(&source).unwrap().unwrap();
    assert_eq!((src.current_quantity(), src.reserved_quantity()), (100, 50));
    assert_eq!(src.available_quantity(), 50);

    transfer_step(&h, execute(order_id), order_id).unwrap();
    let src = h.ledger.get(&source).unwrap().unwrap();
    assert_eq!(
        (src.current_quantity(), src.reserved_quantity(), src.in_transit_quantity()),
        (50, 0, 50)
    );

    transfer_step(&h, receive(order_id), order_id).unwrap();
    let src = h.ledger.get(&source).unwrap().unwrap();
    let dst = h.ledger.get(&destination).unwrap().unwrap();
    assert_eq!((src.current_quantity(), src.in_transit_quantity()), (50, 0));
    assert_eq!(dst.current_quantity(), 50);
    assert_eq!(dst.unit_cost(), dec!(3.50));
    assert_eq!(dst.location_code(), Some("B-07"));

    let view = h.transfers.get(order_id.0).unwrap();
    assert_eq!(view.status(), TransferOrderStatus::Completed);

    let total: i64 = h
        .ledger
        .query(&InventoryFilter {
            item_id: Some(item),
            ..InventoryFilter::default()
        })
        .unwrap()
        .iter()
        .map(|r| r.current_quantity() + r.in_transit_quantity())
        .sum();
    assert_eq!(total, 100);
}

#[test]
fn confirming_more_than_available_reserves_nothing() {
    let h = setup();
    let (w1, w2, item) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
    let source = StockKey::new(w1, item, None);
    h.ledger.receive(&source, 30, dec!(1), None).unwrap();

    let order_id = create_transfer(&h, w1, w2, item, 50);
    let err = transfer_step(&h, confirm(order_id), order_id).unwrap_err();

    assert_eq!(domain_code(&err), "insufficient_available");
    assert_eq!(available(&h.ledger, &source), 30);
    assert_eq!(h.ledger.get(&source).unwrap().unwrap().reserved_quantity(), 0);
    assert_eq!(
        h.transfers.get(order_id.0).unwrap().status(),
        TransferOrderStatus::Draft
    );
}

#[test]
fn cancelling_a_confirmed_transfer_restores_available() {
    let h = setup();
    let (w1, w2, item) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
    let source = StockKey::new(w1, item, None);
    h.ledger.receive(&source, 80, dec!(1), None).unwrap();
    let before = available(&h.ledger, &source);

    let order_id = create_transfer(&h, w1, w2, item, 50);
    transfer_step(&h, confirm(order_id), order_id).unwrap();
    assert_eq!(available(&h.ledger, &source), before - 50);

    transfer_step(&h, cancel(order_id), order_id).unwrap();
    assert_eq!(available(&h.ledger, &source), before);
    assert_eq!(
        h.transfers.get(order_id.0).unwrap().status(),
        TransferOrderStatus::Cancelled
    );

    let err = transfer_step(&h, cancel(order_id), order_id).unwrap_err();
    assert_eq!(domain_code(&err), "invalid_transition");
    assert_eq!(available(&h.ledger, &source), before);
}

#[test]
fn cancelling_in_transit_returns_stock_to_the_source() {
    let h = setup();
    let (w1, w2, item) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
    let source = StockKey::new(w1, item, None);
    h.ledger.receive(&source, 60, dec!(1), None).unwrap();

    let order_id = create_transfer(&h, w1, w2, item, 40);
    transfer_step(&h, confirm(order_id), order_id).unwrap();
    transfer_step(&h, execute(order_id), order_id).unwrap();
    transfer_step(&h, cancel(order_id), order_id).unwrap();

    let src = h.ledger.get(&source).unwrap().unwrap();
    assert_eq!(
        (src.current_quantity(), src.reserved_quantity(), src.in_transit_quantity()),
        (60, 0, 0)
    );
    assert!(h.ledger.get(&StockKey::new(w2, item, None)).unwrap().is_none());
}

#[test]
fn competing_confirmations_never_oversell() {
    let h = Arc::new(setup());
    let (w1, w2, item) = (WarehouseId::new(), WarehouseId::new(), ItemId::new());
    let source = StockKey::new(w1, item, None);
    h.ledger.receive(&source, 100, dec!(1), None).unwrap();

    let orders: Vec<_> = (0..4).map(|_| create_transfer(&h, w1, w2, item, 30)).collect();
    let handles: Vec<_> = orders
        .into_iter()
        .map(|order_id| {
            let h = h.clone();
            std::thread::spawn(move || transfer_step(&h, confirm(order_id), order_id).is_ok())
        })
        .collect();
    let confirmed = handles
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(confirmed, 3);
    let src = h.ledger.get(&source).unwrap().unwrap();
    assert_eq!(src.reserved_quantity(), 90);
    assert_eq!(src.available_quantity(), 10);
}

// ---- counting --------------------------------------------------------------

#[test]
fn count_shortage_is_adjusted_exactly_once() {
    let h = setup();
    let (w, item) = (WarehouseId::new(), ItemId::new());
    let key = StockKey::new(w, item, None);
    h.ledger.receive(&key, 200, dec!(1), Some("A-01")).unwrap();

    let id = AggregateId::new();
    let plan_id = CountPlanId::new(id);
    let dispatch = |command| h.dispatcher.dispatch::<CountPlan>(id, command);

    dispatch(CountPlanCommand::Create(CreateCountPlan {
        plan_id,
        count_number: "CP-20260301-0001".to_string(),
        warehouse_id: w,
        count_person_id: EmployeeId::new(),
        scope: CountScope::default(),
        remark: None,
        occurred_at: Utc::now(),
    }))
    .unwrap();

    let snapshot = h
        .ledger
        .query(&InventoryFilter::for_warehouse(w))
        .unwrap()
        .into_iter()
        .map(|r| SnapshotRow {
            item_id: r.item_id(),
            batch_number: r.batch_number().map(str::to_string),
            location_code: r.location_code().map(str::to_string),
            current_quantity: r.current_quantity(),
        })
        .collect();
    let started = dispatch(CountPlanCommand::Start(StartCount {
        plan_id,
        snapshot,
        occurred_at: Utc::now(),
    }))
    .unwrap();
    let record_id = started.state.records()[0].record_id;

    dispatch(CountPlanCommand::RecordActual(RecordActual {
        plan_id,
        record_id,
        actual_quantity: 180,
        occurred_at: Utc::now(),
    }))
    .unwrap();
    dispatch(CountPlanCommand::Complete(CompleteCount {
        plan_id,
        fill_policy: FillPolicy::BookQuantity,
        occurred_at: Utc::now(),
    }))
    .unwrap();

    let adjusted = dispatch(CountPlanCommand::Adjust(ApplyAdjustments {
        plan_id,
        occurred_at: Utc::now(),
    }))
    .unwrap();
    assert_eq!(adjusted.movements.len(), 1);
    assert_eq!(adjusted.movements[0].current_delta, -20);
    assert_eq!(current(&h.ledger, &key), 180);

    let err = dispatch(CountPlanCommand::Adjust(ApplyAdjustments {
        plan_id,
        occurred_at: Utc::now(),
    }))
    .unwrap_err();
    assert_eq!(domain_code(&err), "already_adjusted");
    assert_eq!(current(&h.ledger, &key), 180);

    let view = h.counts.get(id).unwrap();
    assert_eq!(view.status(), CountPlanStatus::Adjusted);
    let rate = view.records()[0].variance().and_then(|v| v.rate);
    assert_eq!(rate, Some(dec!(-10.00)));
}

// ---- failure handling ------------------------------------------------------

#[test]
fn failed_append_compensates_the_ledger() {
    let h = setup_with(FaultyStore::new(0, offline));
    let (w, item) = (WarehouseId::new(), ItemId::new());
    let key = StockKey::new(w, item, None);
    let order_id = approved_inbound(&h, w, item);

    h.dispatcher.store().fail_next(1);
    let err = execute_inbound(&h, order_id).unwrap_err();
    assert!(matches!(err, DispatchError::Store(EventStoreError::Unavailable(_))));
    assert_eq!(current(&h.ledger, &key), 0);
    assert_eq!(
        h.inbound.get(order_id.0).unwrap().status(),
        InboundOrderStatus::Confirmed
    );

    // The store is back: the same command now succeeds, once.
    execute_inbound(&h, order_id).unwrap();
    assert_eq!(current(&h.ledger, &key), 100);
}

#[test]
fn stale_versions_are_retried_without_double_booking() {
    let h = setup_with(FaultyStore::new(0, stale));
    let (w, item) = (WarehouseId::new(), ItemId::new());
    let key = StockKey::new(w, item, None);
    let order_id = approved_inbound(&h, w, item);

    h.dispatcher.store().fail_next(2);
    execute_inbound(&h, order_id).unwrap();

    assert_eq!(current(&h.ledger, &key), 100);
    assert_eq!(
        h.inbound.get(order_id.0).unwrap().status(),
        InboundOrderStatus::Completed
    );
}

#[test]
fn persistent_conflicts_exhaust_the_retry_limit() {
    let ledger = Arc::new(InventoryLedger::new());
    let store = FaultyStore::new(0, stale);
    let h = Harness {
        dispatcher: CommandDispatcher::new(store, ledger.clone()).with_attempts(2),
        ledger,
        inbound: Arc::new(WorkflowProjection::in_memory()),
        transfers: Arc::new(WorkflowProjection::in_memory()),
        counts: Arc::new(WorkflowProjection::in_memory()),
    };
    let (w, item) = (WarehouseId::new(), ItemId::new());
    let order_id = approved_inbound(&h, w, item);

    h.dispatcher.store().fail_next(5);
    let err = execute_inbound(&h, order_id).unwrap_err();
    match &err {
        DispatchError::Exhausted { attempts, .. } => assert_eq!(*attempts, 2),
        other => panic!("Expected Exhausted, got {other:?}"),
    }
    assert_eq!(domain_code(&err), "concurrency_conflict");
    assert_eq!(current(&h.ledger, &StockKey::new(w, item, None)), 0);
}
