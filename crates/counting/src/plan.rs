use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, EmployeeId, ItemId, WarehouseId,
};
use stockflow_events::Event;
use stockflow_ledger::{LedgerEffect, LedgerOp};

use crate::variance::{Adjustment, FillPolicy, Variance, adjustment_ops, adjustments};

/// Count plan identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountPlanId(pub AggregateId);

impl CountPlanId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountPlanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPlanStatus {
    Draft,
    InProgress,
    Completed,
    Adjusted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountRecordStatus {
    Pending,
    Counted,
    Adjusted,
}

/// Which ledger rows of the warehouse a plan counts.
///
/// An empty item list means every item; a location prefix of `A-` matches
/// `A-01`, `A-02` and so on. Rows without a location only match when no
/// prefix is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountScope {
    #[serde(default)]
    pub item_ids: Vec<ItemId>,
    #[serde(default)]
    pub location_prefix: Option<String>,
}

impl CountScope {
    pub fn includes(&self, item_id: ItemId, location_code: Option<&str>) -> bool {
        let item_ok = self.item_ids.is_empty() || self.item_ids.contains(&item_id);
        let location_ok = match self.location_prefix.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(prefix) => location_code.is_some_and(|l| l.starts_with(prefix)),
        };
        item_ok && location_ok
    }
}

/// Ledger row as seen when counting starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub item_id: ItemId,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub current_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    pub record_id: u32,
    pub item_id: ItemId,
    pub batch_number: Option<String>,
    pub location_code: Option<String>,
    pub book_quantity: i64,
    pub actual_quantity: Option<i64>,
    pub status: CountRecordStatus,
}

impl CountRecord {
    /// `None` until an actual quantity is known.
    pub fn variance(&self) -> Option<Variance> {
        self.actual_quantity
            .map(|actual| Variance::compute(self.book_quantity, actual))
    }
}

/// Aggregate root: CountPlan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountPlan {
    id: CountPlanId,
    count_number: String,
    warehouse_id: Option<WarehouseId>,
    count_person_id: Option<EmployeeId>,
    scope: CountScope,
    remark: Option<String>,
    status: CountPlanStatus,
    cancel_reason: Option<String>,
    records: Vec<CountRecord>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl CountPlan {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CountPlanId) -> Self {
        Self {
            id,
            count_number: String::new(),
            warehouse_id: None,
            count_person_id: None,
            scope: CountScope::default(),
            remark: None,
            status: CountPlanStatus::Draft,
            cancel_reason: None,
            records: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CountPlanId {
        self.id
    }

    pub fn count_number(&self) -> &str {
        &self.count_number
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn count_person_id(&self) -> Option<EmployeeId> {
        self.count_person_id
    }

    pub fn scope(&self) -> &CountScope {
        &self.scope
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn status(&self) -> CountPlanStatus {
        self.status
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn records(&self) -> &[CountRecord] {
        &self.records
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

    pub fn pending_records(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == CountRecordStatus::Pending)
            .count()
    }
}

impl AggregateRoot for CountPlan {
    type Id = CountPlanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCountPlan {
    pub plan_id: CountPlanId,
    pub count_number: String,
    pub warehouse_id: WarehouseId,
    pub count_person_id: EmployeeId,
    pub scope: CountScope,
    pub remark: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartCount. `snapshot` is the warehouse's ledger rows at the time
/// counting starts; the plan keeps the rows inside its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCount {
    pub plan_id: CountPlanId,
    pub snapshot: Vec<SnapshotRow>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActual {
    pub plan_id: CountPlanId,
    pub record_id: u32,
    pub actual_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteCount {
    pub plan_id: CountPlanId,
    pub fill_policy: FillPolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAdjustments {
    pub plan_id: CountPlanId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCount {
    pub plan_id: CountPlanId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountPlanCommand {
    Create(CreateCountPlan),
    Start(StartCount),
    RecordActual(RecordActual),
    Complete(CompleteCount),
    Adjust(ApplyAdjustments),
    Cancel(CancelCount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountPlanCreated {
    pub plan_id: CountPlanId,
    pub count_number: String,
    pub warehouse_id: WarehouseId,
    pub count_person_id: EmployeeId,
    pub scope: CountScope,
    pub remark: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStarted {
    pub plan_id: CountPlanId,
    pub records: Vec<CountRecord>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualRecorded {
    pub plan_id: CountPlanId,
    pub record_id: u32,
    pub actual_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountCompleted. `filled` lists the records given `actual = book`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCompleted {
    pub plan_id: CountPlanId,
    pub fill_policy: FillPolicy,
    pub filled: Vec<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountAdjusted. Every adjustment is applied to the ledger in the
/// transaction that persists this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAdjusted {
    pub plan_id: CountPlanId,
    pub count_number: String,
    pub warehouse_id: WarehouseId,
    pub adjustments: Vec<Adjustment>,
    pub occurred_at: DateTime<Utc>,
}

impl CountAdjusted {
    pub fn total_delta(&self) -> i64 {
        self.adjustments.iter().map(|a| a.delta).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCancelled {
    pub plan_id: CountPlanId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountPlanEvent {
    Created(CountPlanCreated),
    Started(CountStarted),
    ActualRecorded(ActualRecorded),
    Completed(CountCompleted),
    Adjusted(CountAdjusted),
    Cancelled(CountCancelled),
}

impl Event for CountPlanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CountPlanEvent::Created(_) => "counting.plan.created",
            CountPlanEvent::Started(_) => "counting.plan.started",
            CountPlanEvent::ActualRecorded(_) => "counting.plan.actual_recorded",
            CountPlanEvent::Completed(_) => "counting.plan.completed",
            CountPlanEvent::Adjusted(_) => "counting.plan.adjusted",
            CountPlanEvent::Cancelled(_) => "counting.plan.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CountPlanEvent::Created(e) => e.occurred_at,
            CountPlanEvent::Started(e) => e.occurred_at,
            CountPlanEvent::ActualRecorded(e) => e.occurred_at,
            CountPlanEvent::Completed(e) => e.occurred_at,
            CountPlanEvent::Adjusted(e) => e.occurred_at,
            CountPlanEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl LedgerEffect for CountPlanEvent {
    fn ledger_ops(&self) -> Vec<LedgerOp> {
        match self {
            CountPlanEvent::Adjusted(e) => adjustment_ops(e.warehouse_id, &e.adjustments),
            _ => Vec::new(),
        }
    }

    fn document_number(&self) -> Option<&str> {
        match self {
            CountPlanEvent::Adjusted(e) => Some(&e.count_number),
            _ => None,
        }
    }
}

impl Aggregate for CountPlan {
    type Command = CountPlanCommand;
    type Event = CountPlanEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CountPlanEvent::Created(e) => {
                self.id = e.plan_id;
                self.count_number = e.count_number.clone();
                self.warehouse_id = Some(e.warehouse_id);
                self.count_person_id = Some(e.count_person_id);
                self.scope = e.scope.clone();
                self.remark = e.remark.clone();
                self.status = CountPlanStatus::Draft;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            CountPlanEvent::Started(e) => {
                self.records = e.records.clone();
                self.status = CountPlanStatus::InProgress;
            }
            CountPlanEvent::ActualRecorded(e) => {
                if let Some(r) = self.records.iter_mut().find(|r| r.record_id == e.record_id) {
                    r.actual_quantity = Some(e.actual_quantity);
                    r.status = CountRecordStatus::Counted;
                }
            }
            CountPlanEvent::Completed(e) => {
                for r in self
                    .records
                    .iter_mut()
                    .filter(|r| e.filled.contains(&r.record_id))
                {
                    r.actual_quantity = Some(r.book_quantity);
                    r.status = CountRecordStatus::Counted;
                }
                self.status = CountPlanStatus::Completed;
            }
            CountPlanEvent::Adjusted(e) => {
                for r in self.records.iter_mut().filter(|r| {
                    e.adjustments.iter().any(|a| a.record_id == r.record_id)
                }) {
                    r.status = CountRecordStatus::Adjusted;
                }
                self.status = CountPlanStatus::Adjusted;
            }
            CountPlanEvent::Cancelled(e) => {
                self.status = CountPlanStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CountPlanCommand::Create(cmd) => self.handle_create(cmd),
            CountPlanCommand::Start(cmd) => self.handle_start(cmd),
            CountPlanCommand::RecordActual(cmd) => self.handle_record_actual(cmd),
            CountPlanCommand::Complete(cmd) => self.handle_complete(cmd),
            CountPlanCommand::Adjust(cmd) => self.handle_adjust(cmd),
            CountPlanCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl CountPlan {
    fn ensure_plan_id(&self, plan_id: CountPlanId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("count plan {plan_id}")));
        }
        if self.id != plan_id {
            return Err(DomainError::validation("plan_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: CountPlanStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a count plan in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCountPlan) -> Result<Vec<CountPlanEvent>, DomainError> {
        if self.created {
            return Err(DomainError::invalid_transition("count plan already exists"));
        }
        if cmd.count_number.trim().is_empty() {
            return Err(DomainError::validation("count_number is required"));
        }

        let mut scope = cmd.scope.clone();
        scope.item_ids.sort();
        scope.item_ids.dedup();
        scope.location_prefix = scope
            .location_prefix
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(vec![CountPlanEvent::Created(CountPlanCreated {
            plan_id: cmd.plan_id,
            count_number: cmd.count_number.clone(),
            warehouse_id: cmd.warehouse_id,
            count_person_id: cmd.count_person_id,
            scope,
            remark: cmd
                .remark
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartCount) -> Result<Vec<CountPlanEvent>, DomainError> {
        self.ensure_plan_id(cmd.plan_id)?;
        self.ensure_status(CountPlanStatus::Draft, "start")?;

        let records = cmd
            .snapshot
            .iter()
            .filter(|row| self.scope.includes(row.item_id, row.location_code.as_deref()))
            .enumerate()
            .map(|(idx, row)| CountRecord {
                record_id: idx as u32 + 1,
                item_id: row.item_id,
                batch_number: row.batch_number.clone(),
                location_code: row.location_code.clone(),
                book_quantity: row.current_quantity,
                actual_quantity: None,
                status: CountRecordStatus::Pending,
            })
            .collect();

        Ok(vec![CountPlanEvent::Started(CountStarted {
            plan_id: cmd.plan_id,
            records,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_actual(&self, cmd: &RecordActual) -> Result<Vec<CountPlanEvent>, DomainError> {
        self.ensure_plan_id(cmd.plan_id)?;
        self.ensure_status(CountPlanStatus::InProgress, "record counts on")?;
        if cmd.actual_quantity < 0 {
            return Err(DomainError::validation("actual quantity cannot be negative"));
        }
        if !self.records.iter().any(|r| r.record_id == cmd.record_id) {
            return Err(DomainError::not_found(format!("count record {}", cmd.record_id)));
        }

        Ok(vec![CountPlanEvent::ActualRecorded(ActualRecorded {
            plan_id: cmd.plan_id,
            record_id: cmd.record_id,
            actual_quantity: cmd.actual_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteCount) -> Result<Vec<CountPlanEvent>, DomainError> {
        self.ensure_plan_id(cmd.plan_id)?;
        self.ensure_status(CountPlanStatus::InProgress, "complete")?;

        let pending: Vec<u32> = self
            .records
            .iter()
            .filter(|r| r.status == CountRecordStatus::Pending)
            .map(|r| r.record_id)
            .collect();

        let filled = match cmd.fill_policy {
            FillPolicy::BookQuantity => pending,
            FillPolicy::RequireAll if pending.is_empty() => Vec::new(),
            FillPolicy::RequireAll => {
                return Err(DomainError::IncompleteCount {
                    pending: pending.len(),
                });
            }
        };

        Ok(vec![CountPlanEvent::Completed(CountCompleted {
            plan_id: cmd.plan_id,
            fill_policy: cmd.fill_policy,
            filled,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &ApplyAdjustments) -> Result<Vec<CountPlanEvent>, DomainError> {
        self.ensure_plan_id(cmd.plan_id)?;
        // Invariant: variances reach the ledger at most once.
        if self.status == CountPlanStatus::Adjusted {
            return Err(DomainError::AlreadyAdjusted);
        }
        self.ensure_status(CountPlanStatus::Completed, "adjust")?;

        let warehouse_id = match self.warehouse_id {
            Some(w) => w,
            None => return Err(DomainError::validation("warehouse must be set")),
        };

        Ok(vec![CountPlanEvent::Adjusted(CountAdjusted {
            plan_id: cmd.plan_id,
            count_number: self.count_number.clone(),
            warehouse_id,
            adjustments: adjustments(&self.records),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelCount) -> Result<Vec<CountPlanEvent>, DomainError> {
        self.ensure_plan_id(cmd.plan_id)?;
        if !matches!(self.status, CountPlanStatus::Draft | CountPlanStatus::InProgress) {
            return Err(DomainError::invalid_transition(format!(
                "cannot cancel a count plan in status {:?}",
                self.status
            )));
        }
        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancel reason is required"));
        }

        Ok(vec![CountPlanEvent::Cancelled(CountCancelled {
            plan_id: cmd.plan_id,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
