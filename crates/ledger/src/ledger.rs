//! In-process inventory ledger with row-level locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use stockflow_core::{ItemId, WarehouseId};

use crate::error::LedgerError;
use crate::op::{LedgerOp, MovementKind, StockMovement};
use crate::record::{InventoryRecord, InventoryStatus, QualityStatus, StockKey};

/// Reference recorded in the journal for ops applied outside any workflow.
pub const MANUAL_REFERENCE: &str = "manual";

/// How long a transaction waits for a busy row before giving up with
/// [`LedgerError::Contention`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 50,
            backoff: Duration::from_millis(1),
        }
    }
}

/// Query filter for ledger rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub item_id: Option<ItemId>,
    pub inventory_status: Option<InventoryStatus>,
    pub quality_status: Option<QualityStatus>,
}

impl InventoryFilter {
    pub fn for_warehouse(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id: Some(warehouse_id),
            ..Self::default()
        }
    }

    fn matches_key(&self, key: &StockKey) -> bool {
        self.warehouse_id.is_none_or(|w| w == key.warehouse_id)
            && self.item_id.is_none_or(|i| i == key.item_id)
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.matches_key(record.key())
            && self
                .inventory_status
                .is_none_or(|s| s == record.inventory_status())
            && self
                .quality_status
                .is_none_or(|s| s == record.quality_status())
    }
}

/// Query filter for the movement journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub warehouse_id: Option<WarehouseId>,
    pub item_id: Option<ItemId>,
    pub reference: Option<String>,
}

impl MovementFilter {
    fn matches(&self, m: &StockMovement) -> bool {
        self.warehouse_id.is_none_or(|w| w == m.key.warehouse_id)
            && self.item_id.is_none_or(|i| i == m.key.item_id)
            && self.reference.as_deref().is_none_or(|r| r == m.reference)
    }
}

type Row = Arc<Mutex<InventoryRecord>>;

/// Canonical store of quantities per (warehouse, item, batch).
///
/// - Every row has its own lock; a transaction locks all rows it touches in
///   key order, so two transactions can never wait on each other in a cycle.
/// - Ops are staged on copies and committed only when the whole batch passed.
/// - Rows a transaction creates are inserted at commit time. If another
///   transaction created the same row first, the batch fails with
///   `Contention` and the caller retries.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    rows: RwLock<HashMap<StockKey, Row>>,
    journal: Mutex<Vec<StockMovement>>,
    policy: LockPolicy,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_policy(policy: LockPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Apply a batch of ops as one transaction.
    ///
    /// Returns the journal entries written. On error nothing is written.
    #[tracing::instrument(level = "debug", skip(self, ops), fields(ops = ops.len()))]
    pub fn apply(&self, reference: &str, ops: &[LedgerOp]) -> Result<Vec<StockMovement>, LedgerError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut keys: Vec<StockKey> = ops.iter().flat_map(LedgerOp::keys).collect();
        keys.sort();
        keys.dedup();

        let existing: Vec<(StockKey, Row)> = {
            let rows = self.rows.read().map_err(|_| LedgerError::Poisoned)?;
            keys.iter()
                .filter_map(|k| rows.get(k).map(|row| (k.clone(), Arc::clone(row))))
                .collect()
        };

        let mut guards: Vec<MutexGuard<'_, InventoryRecord>> = Vec::with_capacity(existing.len());
        for (key, row) in &existing {
            guards.push(self.lock_row(key, row)?);
        }

        let now = Utc::now();
        let mut staged: BTreeMap<StockKey, InventoryRecord> = guards
            .iter()
            .map(|g| (g.key().clone(), (**g).clone()))
            .collect();

        let mut movements = Vec::new();
        for op in ops {
            stage(op, &mut staged, now, reference, &mut movements)?;
        }

        let created: Vec<StockKey> = staged
            .keys()
            .filter(|k| !existing.iter().any(|(e, _)| e == *k))
            .cloned()
            .collect();

        let mut rows = if created.is_empty() {
            None
        } else {
            let rows = self.rows.write().map_err(|_| LedgerError::Poisoned)?;
            if let Some(taken) = created.iter().find(|k| rows.contains_key(*k)) {
                return Err(LedgerError::Contention(taken.clone()));
            }
            Some(rows)
        };

        for guard in guards.iter_mut() {
            let key = guard.key().clone();
            if let Some(next) = staged.remove(&key) {
                **guard = next;
            }
        }
        if let Some(rows) = rows.as_mut() {
            for key in created {
                if let Some(record) = staged.remove(&key) {
                    rows.insert(key, Arc::new(Mutex::new(record)));
                }
            }
        }
        drop(rows);

        self.journal
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .extend(movements.iter().cloned());

        Ok(movements)
    }

    pub fn reserve(&self, key: &StockKey, quantity: i64) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::Reserve {
            key: key.clone(),
            quantity,
        })
    }

    pub fn release(&self, key: &StockKey, quantity: i64) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::Release {
            key: key.clone(),
            quantity,
        })
    }

    pub fn receive(
        &self,
        key: &StockKey,
        quantity: i64,
        unit_cost: Decimal,
        location_code: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::Receive {
            key: key.clone(),
            quantity,
            unit_cost,
            location_code: location_code.map(str::to_string),
            quality_status: QualityStatus::Qualified,
        })
    }

    pub fn begin_transfer_out(&self, key: &StockKey, quantity: i64) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::BeginTransferOut {
            key: key.clone(),
            quantity,
        })
    }

    pub fn complete_transfer_in(
        &self,
        from: &StockKey,
        to_warehouse: WarehouseId,
        quantity: i64,
        location_code: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::CompleteTransferIn {
            from: from.clone(),
            to_warehouse,
            quantity,
            location_code: location_code.map(str::to_string),
        })
    }

    pub fn reverse_transfer_out(&self, key: &StockKey, quantity: i64) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::ReverseTransferOut {
            key: key.clone(),
            quantity,
        })
    }

    pub fn adjust(&self, key: &StockKey, delta: i64) -> Result<(), LedgerError> {
        self.apply_one(LedgerOp::Adjust {
            key: key.clone(),
            delta,
        })
    }

    /// Snapshot of one row. `Ok(None)` when the row has never been touched.
    pub fn get(&self, key: &StockKey) -> Result<Option<InventoryRecord>, LedgerError> {
        let row = match self.rows.read().map_err(|_| LedgerError::Poisoned)?.get(key) {
            Some(row) => Arc::clone(row),
            None => return Ok(None),
        };
        let record = row.lock().map_err(|_| LedgerError::Poisoned)?.clone();
        Ok(Some(record))
    }

    /// Snapshot of every row matching `filter`, ordered by key.
    pub fn query(&self, filter: &InventoryFilter) -> Result<Vec<InventoryRecord>, LedgerError> {
        // Clone the row handles first so no row lock is awaited under the map lock.
        let rows: Vec<Row> = self
            .rows
            .read()
            .map_err(|_| LedgerError::Poisoned)?
            .iter()
            .filter(|(k, _)| filter.matches_key(k))
            .map(|(_, row)| Arc::clone(row))
            .collect();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row.lock().map_err(|_| LedgerError::Poisoned)?;
            if filter.matches(&record) {
                out.push(record.clone());
            }
        }
        out.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(out)
    }

    pub fn movements(&self, filter: &MovementFilter) -> Result<Vec<StockMovement>, LedgerError> {
        let journal = self.journal.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(journal.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    fn apply_one(&self, op: LedgerOp) -> Result<(), LedgerError> {
        self.apply(MANUAL_REFERENCE, std::slice::from_ref(&op)).map(|_| ())
    }

    fn lock_row<'a>(
        &self,
        key: &StockKey,
        row: &'a Mutex<InventoryRecord>,
    ) -> Result<MutexGuard<'a, InventoryRecord>, LedgerError> {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match row.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => return Err(LedgerError::Poisoned),
                Err(TryLockError::WouldBlock) if attempt < attempts => {
                    std::thread::sleep(self.policy.backoff);
                }
                Err(TryLockError::WouldBlock) => {}
            }
        }
        tracing::debug!(%key, attempts, "ledger row busy");
        Err(LedgerError::Contention(key.clone()))
    }
}

fn stage(
    op: &LedgerOp,
    staged: &mut BTreeMap<StockKey, InventoryRecord>,
    now: DateTime<Utc>,
    reference: &str,
    movements: &mut Vec<StockMovement>,
) -> Result<(), LedgerError> {
    let kind = op.kind();
    let mut journal = |row: &mut InventoryRecord,
                       f: &dyn Fn(&mut InventoryRecord) -> Result<(), LedgerError>|
     -> Result<(), LedgerError> {
        let before = (
            row.current_quantity(),
            row.reserved_quantity(),
            row.in_transit_quantity(),
        );
        f(row)?;
        row.touch(now);
        movements.push(StockMovement {
            movement_id: Uuid::now_v7(),
            key: row.key().clone(),
            kind,
            current_delta: row.current_quantity() - before.0,
            reserved_delta: row.reserved_quantity() - before.1,
            in_transit_delta: row.in_transit_quantity() - before.2,
            reference: reference.to_string(),
            occurred_at: now,
        });
        Ok(())
    };

    match op {
        LedgerOp::Reserve { key, quantity } => {
            let row = existing_or_empty_stock(staged, key, *quantity)?;
            journal(row, &|r| r.reserve(*quantity))
        }
        LedgerOp::Release { key, quantity } => {
            let row = existing(staged, key)?;
            journal(row, &|r| r.release(*quantity))
        }
        LedgerOp::Receive {
            key,
            quantity,
            unit_cost,
            location_code,
            quality_status,
        } => {
            let row = staged
                .entry(key.clone())
                .or_insert_with(|| InventoryRecord::empty(key.clone(), now));
            journal(row, &|r| {
                r.receive(*quantity, *unit_cost, location_code.as_deref(), *quality_status)
            })
        }
        LedgerOp::BeginTransferOut { key, quantity } => {
            let row = existing_or_empty_stock(staged, key, *quantity)?;
            journal(row, &|r| r.transfer_out(*quantity))
        }
        LedgerOp::CompleteTransferIn {
            from,
            to_warehouse,
            quantity,
            location_code,
        } => {
            let source = existing(staged, from)?;
            let unit_cost = source.unit_cost();
            journal(source, &|r| r.clear_in_transit(*quantity))?;

            let to_key = from.in_warehouse(*to_warehouse);
            let dest = staged
                .entry(to_key.clone())
                .or_insert_with(|| InventoryRecord::empty(to_key, now));
            journal(dest, &|r| r.transfer_in(*quantity, unit_cost, location_code.as_deref()))
        }
        LedgerOp::ReverseTransferOut { key, quantity } => {
            let row = existing(staged, key)?;
            journal(row, &|r| r.reverse_transfer_out(*quantity))
        }
        LedgerOp::Adjust { key, delta } => {
            let row = existing(staged, key)?;
            journal(row, &|r| r.adjust(*delta))
        }
    }
}

fn existing<'a>(
    staged: &'a mut BTreeMap<StockKey, InventoryRecord>,
    key: &StockKey,
) -> Result<&'a mut InventoryRecord, LedgerError> {
    staged
        .get_mut(key)
        .ok_or_else(|| LedgerError::UnknownRecord(key.clone()))
}

/// Rows that were never stocked have nothing available.
fn existing_or_empty_stock<'a>(
    staged: &'a mut BTreeMap<StockKey, InventoryRecord>,
    key: &StockKey,
    requested: i64,
) -> Result<&'a mut InventoryRecord, LedgerError> {
    staged
        .get_mut(key)
        .ok_or_else(|| LedgerError::InsufficientAvailable {
            key: key.clone(),
            requested,
            available: 0,
        })
}
