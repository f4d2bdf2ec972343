use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ItemId, WarehouseId};
use stockflow_events::Event;
use stockflow_ledger::{LedgerEffect, LedgerOp, StockKey};

/// Transfer order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferOrderId(pub AggregateId);

impl TransferOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOrderStatus {
    Draft,
    Confirmed,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferOrderStatus::Completed | TransferOrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrderLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub batch_number: Option<String>,
    pub transfer_quantity: i64,
    pub unit: String,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineInput {
    pub item_id: ItemId,
    pub batch_number: Option<String>,
    pub transfer_quantity: i64,
    pub unit: String,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

/// Aggregate root: TransferOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOrder {
    id: TransferOrderId,
    transfer_number: String,
    from_warehouse_id: Option<WarehouseId>,
    to_warehouse_id: Option<WarehouseId>,
    status: TransferOrderStatus,
    remark: Option<String>,
    cancel_reason: Option<String>,
    lines: Vec<TransferOrderLine>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl TransferOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TransferOrderId) -> Self {
        Self {
            id,
            transfer_number: String::new(),
            from_warehouse_id: None,
            to_warehouse_id: None,
            status: TransferOrderStatus::Draft,
            remark: None,
            cancel_reason: None,
            lines: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferOrderId {
        self.id
    }

    pub fn transfer_number(&self) -> &str {
        &self.transfer_number
    }

    pub fn from_warehouse_id(&self) -> Option<WarehouseId> {
        self.from_warehouse_id
    }

    pub fn to_warehouse_id(&self) -> Option<WarehouseId> {
        self.to_warehouse_id
    }

    pub fn status(&self) -> TransferOrderStatus {
        self.status
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn lines(&self) -> &[TransferOrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for TransferOrder {
    type Id = TransferOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransferOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransferOrder {
    pub order_id: TransferOrderId,
    pub transfer_number: String,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub remark: Option<String>,
    pub lines: Vec<TransferLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmTransferOrder. Reserves every line at the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTransferOrder {
    pub order_id: TransferOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExecuteTransferOrder. Ships the reserved stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteTransferOrder {
    pub order_id: TransferOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveTransferOrder. Books the shipment into the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransferOrder {
    pub order_id: TransferOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransferOrder {
    pub order_id: TransferOrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOrderCommand {
    Create(CreateTransferOrder),
    Confirm(ConfirmTransferOrder),
    Execute(ExecuteTransferOrder),
    Receive(ReceiveTransferOrder),
    Cancel(CancelTransferOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrderCreated {
    pub order_id: TransferOrderId,
    pub transfer_number: String,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub remark: Option<String>,
    pub lines: Vec<TransferOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Shared payload of the events that move stock: which document, which
/// warehouses and which lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLegs {
    pub order_id: TransferOrderId,
    pub transfer_number: String,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub lines: Vec<TransferOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

impl TransferLegs {
    fn source_key(&self, line: &TransferOrderLine) -> StockKey {
        StockKey::new(self.from_warehouse_id, line.item_id, line.batch_number.clone())
    }

    fn reserve_ops(&self) -> Vec<LedgerOp> {
        self.lines
            .iter()
            .map(|l| LedgerOp::Reserve {
                key: self.source_key(l),
                quantity: l.transfer_quantity,
            })
            .collect()
    }

    fn release_ops(&self) -> Vec<LedgerOp> {
        self.lines
            .iter()
            .map(|l| LedgerOp::Release {
                key: self.source_key(l),
                quantity: l.transfer_quantity,
            })
            .collect()
    }

    fn ship_ops(&self) -> Vec<LedgerOp> {
        self.lines
            .iter()
            .flat_map(|l| {
                [
                    LedgerOp::Release {
                        key: self.source_key(l),
                        quantity: l.transfer_quantity,
                    },
                    LedgerOp::BeginTransferOut {
                        key: self.source_key(l),
                        quantity: l.transfer_quantity,
                    },
                ]
            })
            .collect()
    }

    fn arrive_ops(&self) -> Vec<LedgerOp> {
        self.lines
            .iter()
            .map(|l| LedgerOp::CompleteTransferIn {
                from: self.source_key(l),
                to_warehouse: self.to_warehouse_id,
                quantity: l.transfer_quantity,
                location_code: l.to_location.clone(),
            })
            .collect()
    }

    fn return_ops(&self) -> Vec<LedgerOp> {
        self.lines
            .iter()
            .map(|l| LedgerOp::ReverseTransferOut {
                key: self.source_key(l),
                quantity: l.transfer_quantity,
            })
            .collect()
    }
}

/// Event: TransferOrderCancelled. `cancelled_from` decides how the ledger
/// is unwound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrderCancelled {
    pub legs: TransferLegs,
    pub cancelled_from: TransferOrderStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOrderEvent {
    Created(TransferOrderCreated),
    Confirmed(TransferLegs),
    Executed(TransferLegs),
    Received(TransferLegs),
    Cancelled(TransferOrderCancelled),
}

impl Event for TransferOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferOrderEvent::Created(_) => "transfer.order.created",
            TransferOrderEvent::Confirmed(_) => "transfer.order.confirmed",
            TransferOrderEvent::Executed(_) => "transfer.order.executed",
            TransferOrderEvent::Received(_) => "transfer.order.received",
            TransferOrderEvent::Cancelled(_) => "transfer.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferOrderEvent::Created(e) => e.occurred_at,
            TransferOrderEvent::Confirmed(e)
            | TransferOrderEvent::Executed(e)
            | TransferOrderEvent::Received(e) => e.occurred_at,
            TransferOrderEvent::Cancelled(e) => e.legs.occurred_at,
        }
    }
}

impl LedgerEffect for TransferOrderEvent {
    fn ledger_ops(&self) -> Vec<LedgerOp> {
        match self {
            TransferOrderEvent::Created(_) => Vec::new(),
            TransferOrderEvent::Confirmed(legs) => legs.reserve_ops(),
            TransferOrderEvent::Executed(legs) => legs.ship_ops(),
            TransferOrderEvent::Received(legs) => legs.arrive_ops(),
            TransferOrderEvent::Cancelled(e) => match e.cancelled_from {
                TransferOrderStatus::Confirmed => e.legs.release_ops(),
                TransferOrderStatus::InTransit => e.legs.return_ops(),
                _ => Vec::new(),
            },
        }
    }

    fn document_number(&self) -> Option<&str> {
        match self {
            TransferOrderEvent::Created(e) => Some(&e.transfer_number),
            TransferOrderEvent::Confirmed(legs)
            | TransferOrderEvent::Executed(legs)
            | TransferOrderEvent::Received(legs) => Some(&legs.transfer_number),
            TransferOrderEvent::Cancelled(e) => Some(&e.legs.transfer_number),
        }
    }
}

impl Aggregate for TransferOrder {
    type Command = TransferOrderCommand;
    type Event = TransferOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferOrderEvent::Created(e) => {
                self.id = e.order_id;
                self.transfer_number = e.transfer_number.clone();
                self.from_warehouse_id = Some(e.from_warehouse_id);
                self.to_warehouse_id = Some(e.to_warehouse_id);
                self.status = TransferOrderStatus::Draft;
                self.remark = e.remark.clone();
                self.lines = e.lines.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            TransferOrderEvent::Confirmed(_) => {
                self.status = TransferOrderStatus::Confirmed;
            }
            TransferOrderEvent::Executed(_) => {
                self.status = TransferOrderStatus::InTransit;
            }
            TransferOrderEvent::Received(_) => {
                self.status = TransferOrderStatus::Completed;
            }
            TransferOrderEvent::Cancelled(e) => {
                self.status = TransferOrderStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferOrderCommand::Create(cmd) => self.handle_create(cmd),
            TransferOrderCommand::Confirm(cmd) => self.handle_confirm(cmd),
            TransferOrderCommand::Execute(cmd) => self.handle_execute(cmd),
            TransferOrderCommand::Receive(cmd) => self.handle_receive(cmd),
            TransferOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl TransferOrder {
    fn ensure_order_id(&self, order_id: TransferOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("transfer order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: TransferOrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a transfer order in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn legs(&self, order_id: TransferOrderId, occurred_at: DateTime<Utc>) -> Result<TransferLegs, DomainError> {
        match (self.from_warehouse_id, self.to_warehouse_id) {
            (Some(from), Some(to)) => Ok(TransferLegs {
                order_id,
                transfer_number: self.transfer_number.clone(),
                from_warehouse_id: from,
                to_warehouse_id: to,
                lines: self.lines.clone(),
                occurred_at,
            }),
            _ => Err(DomainError::validation("transfer warehouses must be set")),
        }
    }

    fn handle_create(&self, cmd: &CreateTransferOrder) -> Result<Vec<TransferOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invalid_transition("transfer order already exists"));
        }
        if cmd.transfer_number.trim().is_empty() {
            return Err(DomainError::validation("transfer_number is required"));
        }
        if cmd.from_warehouse_id == cmd.to_warehouse_id {
            return Err(DomainError::validation(
                "source and destination warehouse must differ",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a transfer order needs at least one line"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if input.transfer_quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: transfer quantity must be positive"
                )));
            }
            let unit = input.unit.trim();
            if unit.is_empty() {
                return Err(DomainError::validation(format!("line {line_no}: unit is required")));
            }
            lines.push(TransferOrderLine {
                line_no,
                item_id: input.item_id,
                batch_number: normalize(input.batch_number.as_deref()),
                transfer_quantity: input.transfer_quantity,
                unit: unit.to_string(),
                from_location: normalize(input.from_location.as_deref()),
                to_location: normalize(input.to_location.as_deref()),
            });
        }

        Ok(vec![TransferOrderEvent::Created(TransferOrderCreated {
            order_id: cmd.order_id,
            transfer_number: cmd.transfer_number.clone(),
            from_warehouse_id: cmd.from_warehouse_id,
            to_warehouse_id: cmd.to_warehouse_id,
            remark: normalize(cmd.remark.as_deref()),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmTransferOrder) -> Result<Vec<TransferOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_status(TransferOrderStatus::Draft, "confirm")?;
        Ok(vec![TransferOrderEvent::Confirmed(
            self.legs(cmd.order_id, cmd.occurred_at)?,
        )])
    }

    fn handle_execute(&self, cmd: &ExecuteTransferOrder) -> Result<Vec<TransferOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_status(TransferOrderStatus::Confirmed, "execute")?;
        Ok(vec![TransferOrderEvent::Executed(
            self.legs(cmd.order_id, cmd.occurred_at)?,
        )])
    }

    fn handle_receive(&self, cmd: &ReceiveTransferOrder) -> Result<Vec<TransferOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_status(TransferOrderStatus::InTransit, "receive")?;
        Ok(vec![TransferOrderEvent::Received(
            self.legs(cmd.order_id, cmd.occurred_at)?,
        )])
    }

    fn handle_cancel(&self, cmd: &CancelTransferOrder) -> Result<Vec<TransferOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "cannot cancel a transfer order in status {:?}",
                self.status
            )));
        }
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancel reason is required"));
        }

        Ok(vec![TransferOrderEvent::Cancelled(TransferOrderCancelled {
            legs: self.legs(cmd.order_id, cmd.occurred_at)?,
            cancelled_from: self.status,
            reason: reason.to_string(),
        })])
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order_id() -> TransferOrderId {
        TransferOrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(item_id: ItemId, quantity: i64) -> TransferLineInput {
        TransferLineInput {
            item_id,
            batch_number: None,
            transfer_quantity: quantity,
            unit: "pcs".to_string(),
            from_location: Some("A-01".to_string()),
            to_location: Some("B-02".to_string()),
        }
    }

    fn run(order: &mut TransferOrder, cmd: TransferOrderCommand) -> Vec<TransferOrderEvent> {
        order.process(&cmd).unwrap()
    }

    fn created(item_id: ItemId, quantity: i64) -> TransferOrder {
        let order_id = test_order_id();
        let mut order = TransferOrder::empty(order_id);
        run(
            &mut order,
            TransferOrderCommand::Create(CreateTransferOrder {
                order_id,
                transfer_number: "TR-20240101-0001".to_string(),
                from_warehouse_id: WarehouseId::new(),
                to_warehouse_id: WarehouseId::new(),
                remark: None,
                lines: vec![line(item_id, quantity)],
                occurred_at: test_time(),
            }),
        );
        order
    }

    fn confirm(order: &mut TransferOrder) -> Vec<TransferOrderEvent> {
        let order_id = order.id_typed();
        run(
            order,
            TransferOrderCommand::Confirm(ConfirmTransferOrder {
                order_id,
                occurred_at: test_time(),
            }),
        )
    }

    fn execute(order: &mut TransferOrder) -> Vec<TransferOrderEvent> {
        let order_id = order.id_typed();
        run(
            order,
            TransferOrderCommand::Execute(ExecuteTransferOrder {
                order_id,
                occurred_at: test_time(),
            }),
        )
    }

    fn cancel_cmd(order: &TransferOrder) -> TransferOrderCommand {
        TransferOrderCommand::Cancel(CancelTransferOrder {
            order_id: order.id_typed(),
            reason: "no longer needed".to_string(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_rejects_same_warehouse() {
        let order_id = test_order_id();
        let order = TransferOrder::empty(order_id);
        let w = WarehouseId::new();
        let err = order
            .handle(&TransferOrderCommand::Create(CreateTransferOrder {
                order_id,
                transfer_number: "TR-1".to_string(),
                from_warehouse_id: w,
                to_warehouse_id: w,
                remark: None,
                lines: vec![line(ItemId::new(), 5)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("must differ") => {}
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_non_positive_quantities() {
        let order_id = test_order_id();
        let order = TransferOrder::empty(order_id);
        let err = order
            .handle(&TransferOrderCommand::Create(CreateTransferOrder {
                order_id,
                transfer_number: "TR-1".to_string(),
                from_warehouse_id: WarehouseId::new(),
                to_warehouse_id: WarehouseId::new(),
                remark: None,
                lines: vec![line(ItemId::new(), 5), line(ItemId::new(), 0)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn lifecycle_emits_reserve_ship_and_arrive_ops() {
        let item = ItemId::new();
        let mut order = created(item, 50);
        let from = order.from_warehouse_id().unwrap();
        let to = order.to_warehouse_id().unwrap();

        let events = confirm(&mut order);
        assert_eq!(order.status(), TransferOrderStatus::Confirmed);
        assert_eq!(
            events[0].ledger_ops(),
            vec![LedgerOp::Reserve {
                key: StockKey::new(from, item, None),
                quantity: 50
            }]
        );

        let events = execute(&mut order);
        assert_eq!(order.status(), TransferOrderStatus::InTransit);
        let ops = events[0].ledger_ops();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], LedgerOp::Release { quantity: 50, .. }));
        assert!(matches!(ops[1], LedgerOp::BeginTransferOut { quantity: 50, .. }));

        let order_id = order.id_typed();
        let events = run(
            &mut order,
            TransferOrderCommand::Receive(ReceiveTransferOrder {
                order_id,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(order.status(), TransferOrderStatus::Completed);
        match &events[0].ledger_ops()[0] {
            LedgerOp::CompleteTransferIn {
                to_warehouse,
                location_code,
                ..
            } => {
                assert_eq!(*to_warehouse, to);
                assert_eq!(location_code.as_deref(), Some("B-02"));
            }
            other => panic!("Expected CompleteTransferIn, got {other:?}"),
        }
        assert_eq!(events[0].document_number(), Some("TR-20240101-0001"));
    }

    #[test]
    fn receive_before_shipping_is_rejected() {
        let mut order = created(ItemId::new(), 5);
        confirm(&mut order);
        let err = order
            .handle(&TransferOrderCommand::Receive(ReceiveTransferOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn cancel_unwinds_according_to_status() {
        let draft = created(ItemId::new(), 5);
        let events = draft.handle(&cancel_cmd(&draft)).unwrap();
        assert!(events[0].ledger_ops().is_empty());

        let mut confirmed = created(ItemId::new(), 5);
        confirm(&mut confirmed);
        let events = confirmed.handle(&cancel_cmd(&confirmed)).unwrap();
        assert!(matches!(events[0].ledger_ops()[0], LedgerOp::Release { quantity: 5, .. }));

        let mut shipped = created(ItemId::new(), 5);
        confirm(&mut shipped);
        execute(&mut shipped);
        let cmd = cancel_cmd(&shipped);
        let events = run(&mut shipped, cmd);
        assert!(matches!(
            events[0].ledger_ops()[0],
            LedgerOp::ReverseTransferOut { quantity: 5, .. }
        ));
        assert_eq!(shipped.status(), TransferOrderStatus::Cancelled);
        assert_eq!(shipped.cancel_reason(), Some("no longer needed"));

        let err = shipped.handle(&cancel_cmd(&shipped)).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn unknown_order_is_not_found() {
        let order = TransferOrder::empty(test_order_id());
        let err = order
            .handle(&TransferOrderCommand::Confirm(ConfirmTransferOrder {
                order_id: order.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
