use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, EmployeeId, ItemId, LocalKey, RowKey,
    WarehouseId,
};
use stockflow_events::Event;
use stockflow_ledger::{LedgerEffect, LedgerOp, QualityStatus, StockKey};

use crate::approval::{ApprovalDecision, ApprovalGate};

/// Inbound order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboundOrderId(pub AggregateId);

impl InboundOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InboundOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Inbound order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundOrderStatus {
    Draft,
    Confirmed,
    Completed,
    Cancelled,
}

impl InboundOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InboundOrderStatus::Completed | InboundOrderStatus::Cancelled)
    }
}

/// Persisted inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub inbound_quantity: i64,
    pub unit_cost: Decimal,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub quality_status: QualityStatus,
}

/// Line as submitted by a client.
///
/// `row` is `Local` for rows the client has not saved yet and `Saved` for rows
/// that already carry a `line_no`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub row: RowKey,
    pub item_id: ItemId,
    pub inbound_quantity: i64,
    pub unit_cost: Decimal,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub quality_status: Option<QualityStatus>,
}

/// `line_no` given to a row the client only knew by its local key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAssignment {
    pub local_key: LocalKey,
    pub line_no: u32,
}

/// Aggregate root: InboundOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundOrder {
    id: InboundOrderId,
    order_number: String,
    warehouse_id: Option<WarehouseId>,
    status: InboundOrderStatus,
    approval: ApprovalGate,
    remark: Option<String>,
    cancel_reason: Option<String>,
    lines: Vec<InboundOrderLine>,
    next_line_no: u32,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl InboundOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InboundOrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            warehouse_id: None,
            status: InboundOrderStatus::Draft,
            approval: ApprovalGate::pending(),
            remark: None,
            cancel_reason: None,
            lines: Vec::new(),
            next_line_no: 1,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> InboundOrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn status(&self) -> InboundOrderStatus {
        self.status
    }

    pub fn approval(&self) -> &ApprovalGate {
        &self.approval
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn lines(&self) -> &[InboundOrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Whether the order exists (created and not deleted).
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for InboundOrder {
    type Id = InboundOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInboundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInboundOrder {
    pub order_id: InboundOrderId,
    pub order_number: String,
    pub warehouse_id: WarehouseId,
    pub remark: Option<String>,
    pub lines: Vec<LineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditInboundOrder (draft only).
///
/// `lines`, when present, is the complete new line set: saved rows not listed
/// are removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInboundOrder {
    pub order_id: InboundOrderId,
    pub warehouse_id: Option<WarehouseId>,
    pub remark: Option<String>,
    pub lines: Option<Vec<LineInput>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteInboundOrder (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteInboundOrder {
    pub order_id: InboundOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmInboundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmInboundOrder {
    pub order_id: InboundOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviewInboundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInboundOrder {
    pub order_id: InboundOrderId,
    pub decision: ApprovalDecision,
    /// Optional; the decision stands without a named reviewer.
    pub reviewer_id: Option<EmployeeId>,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExecuteInboundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteInboundOrder {
    pub order_id: InboundOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInboundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInboundOrder {
    pub order_id: InboundOrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundOrderCommand {
    Create(CreateInboundOrder),
    Edit(EditInboundOrder),
    Delete(DeleteInboundOrder),
    Confirm(ConfirmInboundOrder),
    Review(ReviewInboundOrder),
    Execute(ExecuteInboundOrder),
    Cancel(CancelInboundOrder),
}

/// Event: InboundOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderCreated {
    pub order_id: InboundOrderId,
    pub order_number: String,
    pub warehouse_id: WarehouseId,
    pub remark: Option<String>,
    pub lines: Vec<InboundOrderLine>,
    pub assigned: Vec<KeyAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderEdited. Carries the resulting order header and lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderEdited {
    pub order_id: InboundOrderId,
    pub warehouse_id: WarehouseId,
    pub remark: Option<String>,
    pub lines: Vec<InboundOrderLine>,
    pub assigned: Vec<KeyAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderDeleted {
    pub order_id: InboundOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderConfirmed {
    pub order_id: InboundOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderReviewed. Holds the gate as it stands after the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderReviewed {
    pub order_id: InboundOrderId,
    pub approval: ApprovalGate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderExecuted.
///
/// Every line is received into the ledger in the same transaction that
/// persists this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderExecuted {
    pub order_id: InboundOrderId,
    pub order_number: String,
    pub warehouse_id: WarehouseId,
    pub lines: Vec<InboundOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundOrderCancelled {
    pub order_id: InboundOrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundOrderEvent {
    Created(InboundOrderCreated),
    Edited(InboundOrderEdited),
    Deleted(InboundOrderDeleted),
    Confirmed(InboundOrderConfirmed),
    Reviewed(InboundOrderReviewed),
    Executed(InboundOrderExecuted),
    Cancelled(InboundOrderCancelled),
}

impl Event for InboundOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InboundOrderEvent::Created(_) => "inbound.order.created",
            InboundOrderEvent::Edited(_) => "inbound.order.edited",
            InboundOrderEvent::Deleted(_) => "inbound.order.deleted",
            InboundOrderEvent::Confirmed(_) => "inbound.order.confirmed",
            InboundOrderEvent::Reviewed(_) => "inbound.order.reviewed",
            InboundOrderEvent::Executed(_) => "inbound.order.executed",
            InboundOrderEvent::Cancelled(_) => "inbound.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InboundOrderEvent::Created(e) => e.occurred_at,
            InboundOrderEvent::Edited(e) => e.occurred_at,
            InboundOrderEvent::Deleted(e) => e.occurred_at,
            InboundOrderEvent::Confirmed(e) => e.occurred_at,
            InboundOrderEvent::Reviewed(e) => e.occurred_at,
            InboundOrderEvent::Executed(e) => e.occurred_at,
            InboundOrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl LedgerEffect for InboundOrderEvent {
    fn ledger_ops(&self) -> Vec<LedgerOp> {
        match self {
            InboundOrderEvent::Executed(e) => e
                .lines
                .iter()
                .map(|line| LedgerOp::Receive {
                    key: StockKey::new(e.warehouse_id, line.item_id, line.batch_number.clone()),
                    quantity: line.inbound_quantity,
                    unit_cost: line.unit_cost,
                    location_code: line.location_code.clone(),
                    quality_status: line.quality_status,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn document_number(&self) -> Option<&str> {
        match self {
            InboundOrderEvent::Executed(e) => Some(&e.order_number),
            _ => None,
        }
    }
}

impl Aggregate for InboundOrder {
    type Command = InboundOrderCommand;
    type Event = InboundOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InboundOrderEvent::Created(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.warehouse_id = Some(e.warehouse_id);
                self.status = InboundOrderStatus::Draft;
                self.approval = ApprovalGate::pending();
                self.remark = e.remark.clone();
                self.lines = e.lines.clone();
                self.next_line_no = next_line_no_after(&e.lines, 1);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            InboundOrderEvent::Edited(e) => {
                self.warehouse_id = Some(e.warehouse_id);
                self.remark = e.remark.clone();
                self.lines = e.lines.clone();
                self.next_line_no = next_line_no_after(&e.lines, self.next_line_no);
            }
            InboundOrderEvent::Deleted(_) => {
                self.deleted = true;
            }
            InboundOrderEvent::Confirmed(_) => {
                self.status = InboundOrderStatus::Confirmed;
            }
            InboundOrderEvent::Reviewed(e) => {
                self.approval = e.approval.clone();
            }
            InboundOrderEvent::Executed(_) => {
                self.status = InboundOrderStatus::Completed;
            }
            InboundOrderEvent::Cancelled(e) => {
                self.status = InboundOrderStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
            }
        }

        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InboundOrderCommand::Create(cmd) => self.handle_create(cmd),
            InboundOrderCommand::Edit(cmd) => self.handle_edit(cmd),
            InboundOrderCommand::Delete(cmd) => self.handle_delete(cmd),
            InboundOrderCommand::Confirm(cmd) => self.handle_confirm(cmd),
            InboundOrderCommand::Review(cmd) => self.handle_review(cmd),
            InboundOrderCommand::Execute(cmd) => self.handle_execute(cmd),
            InboundOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl InboundOrder {
    fn ensure_exists(&self, order_id: InboundOrderId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("inbound order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> Result<(), DomainError> {
        if self.status != InboundOrderStatus::Draft {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} an inbound order in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invalid_transition("inbound order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number is required"));
        }

        let (lines, assigned) = resolve_lines(&[], 1, &cmd.lines)?;
        validate_lines(&lines)?;

        Ok(vec![InboundOrderEvent::Created(InboundOrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            warehouse_id: cmd.warehouse_id,
            remark: normalize(cmd.remark.as_deref()),
            lines,
            assigned,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_draft("edit")?;

        let warehouse_id = match cmd.warehouse_id.or(self.warehouse_id) {
            Some(w) => w,
            None => return Err(DomainError::validation("warehouse_id is required")),
        };

        let (lines, assigned) = match &cmd.lines {
            Some(input) => resolve_lines(&self.lines, self.next_line_no, input)?,
            None => (self.lines.clone(), Vec::new()),
        };
        validate_lines(&lines)?;

        let remark = match &cmd.remark {
            Some(r) => normalize(Some(r.as_str())),
            None => self.remark.clone(),
        };

        Ok(vec![InboundOrderEvent::Edited(InboundOrderEdited {
            order_id: cmd.order_id,
            warehouse_id,
            remark,
            lines,
            assigned,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_draft("delete")?;

        Ok(vec![InboundOrderEvent::Deleted(InboundOrderDeleted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_draft("confirm")?;
        validate_lines(&self.lines)?;

        Ok(vec![InboundOrderEvent::Confirmed(InboundOrderConfirmed {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_review(&self, cmd: &ReviewInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "cannot review an inbound order in status {:?}",
                self.status
            )));
        }

        let approval = self.approval.decide(
            cmd.decision,
            cmd.reviewer_id,
            cmd.comment.clone(),
            cmd.occurred_at,
        )?;

        Ok(vec![InboundOrderEvent::Reviewed(InboundOrderReviewed {
            order_id: cmd.order_id,
            approval,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_execute(&self, cmd: &ExecuteInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        // Invariant: receipt needs both a confirmed order and an approved gate.
        if self.status != InboundOrderStatus::Confirmed {
            return Err(DomainError::invalid_transition(format!(
                "cannot execute an inbound order in status {:?}",
                self.status
            )));
        }
        if !self.approval.is_approved() {
            return Err(DomainError::invalid_transition(format!(
                "inbound order is not approved (approval {:?})",
                self.approval.status()
            )));
        }
        let warehouse_id = match self.warehouse_id {
            Some(w) => w,
            None => return Err(DomainError::validation("warehouse must be set")),
        };

        Ok(vec![InboundOrderEvent::Executed(InboundOrderExecuted {
            order_id: cmd.order_id,
            order_number: self.order_number.clone(),
            warehouse_id,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInboundOrder) -> Result<Vec<InboundOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "cannot cancel an inbound order in status {:?}",
                self.status
            )));
        }
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancel reason is required"));
        }

        Ok(vec![InboundOrderEvent::Cancelled(InboundOrderCancelled {
            order_id: cmd.order_id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Turn submitted rows into persisted lines.
///
/// Saved rows must exist in `current` and appear at most once; local rows get
/// fresh line numbers starting at `next_line_no`, in submission order.
fn resolve_lines(
    current: &[InboundOrderLine],
    next_line_no: u32,
    input: &[LineInput],
) -> Result<(Vec<InboundOrderLine>, Vec<KeyAssignment>), DomainError> {
    let mut seen_saved = HashSet::new();
    let mut seen_local = HashSet::new();
    let mut next = next_line_no;
    let mut lines = Vec::with_capacity(input.len());
    let mut assigned = Vec::new();

    for row in input {
        let line_no = match &row.row {
            RowKey::Saved(n) => {
                if !current.iter().any(|l| l.line_no == *n) {
                    return Err(DomainError::validation(format!("line {n} does not exist")));
                }
                if !seen_saved.insert(*n) {
                    return Err(DomainError::validation(format!("line {n} submitted twice")));
                }
                *n
            }
            RowKey::Local(key) => {
                if !seen_local.insert(key.clone()) {
                    return Err(DomainError::validation(format!(
                        "local key {} submitted twice",
                        key.as_str()
                    )));
                }
                let n = next;
                next += 1;
                assigned.push(KeyAssignment {
                    local_key: key.clone(),
                    line_no: n,
                });
                n
            }
        };

        lines.push(InboundOrderLine {
            line_no,
            item_id: row.item_id,
            inbound_quantity: row.inbound_quantity,
            unit_cost: row.unit_cost,
            batch_number: normalize(row.batch_number.as_deref()),
            location_code: normalize(row.location_code.as_deref()),
            quality_status: row.quality_status.unwrap_or_default(),
        });
    }

    Ok((lines, assigned))
}

fn validate_lines(lines: &[InboundOrderLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("an inbound order needs at least one line"));
    }
    for line in lines {
        if line.inbound_quantity <= 0 {
            return Err(DomainError::validation(format!(
                "line {}: inbound quantity must be positive",
                line.line_no
            )));
        }
        if line.unit_cost.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {}: unit cost cannot be negative",
                line.line_no
            )));
        }
    }
    Ok(())
}

fn next_line_no_after(lines: &[InboundOrderLine], floor: u32) -> u32 {
    lines
        .iter()
        .map(|l| l.line_no + 1)
        .max()
        .unwrap_or(floor)
        .max(floor)
}

fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
