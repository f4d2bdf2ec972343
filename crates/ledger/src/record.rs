use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{ItemId, WarehouseId};

use crate::error::LedgerError;

/// Ledger row key: one row per (warehouse, item, batch).
///
/// Ordering is total so multi-row transactions can lock rows in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
    pub batch_number: Option<String>,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, item_id: ItemId, batch_number: Option<String>) -> Self {
        // Blank batch numbers from forms mean "unbatched".
        let batch_number = batch_number
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        Self {
            warehouse_id,
            item_id,
            batch_number,
        }
    }

    /// Same item and batch, in another warehouse.
    pub fn in_warehouse(&self, warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            item_id: self.item_id,
            batch_number: self.batch_number.clone(),
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.warehouse_id,
            self.item_id,
            self.batch_number.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    #[default]
    Normal,
    Blocked,
    Quarantine,
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityStatus {
    #[default]
    Qualified,
    Unqualified,
    Pending,
}

/// One ledger row.
///
/// Invariants, held after every committed transaction:
/// - `available_quantity() = current - reserved >= 0`
/// - `in_transit >= 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    key: StockKey,
    location_code: Option<String>,
    current_quantity: i64,
    reserved_quantity: i64,
    in_transit_quantity: i64,
    unit_cost: Decimal,
    inventory_status: InventoryStatus,
    quality_status: QualityStatus,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    pub(crate) fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            location_code: None,
            current_quantity: 0,
            reserved_quantity: 0,
            in_transit_quantity: 0,
            unit_cost: Decimal::ZERO,
            inventory_status: InventoryStatus::Normal,
            quality_status: QualityStatus::Qualified,
            updated_at: now,
        }
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.key.warehouse_id
    }

    pub fn item_id(&self) -> ItemId {
        self.key.item_id
    }

    pub fn batch_number(&self) -> Option<&str> {
        self.key.batch_number.as_deref()
    }

    pub fn location_code(&self) -> Option<&str> {
        self.location_code.as_deref()
    }

    pub fn current_quantity(&self) -> i64 {
        self.current_quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn in_transit_quantity(&self) -> i64 {
        self.in_transit_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.current_quantity - self.reserved_quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn inventory_status(&self) -> InventoryStatus {
        self.inventory_status
    }

    pub fn quality_status(&self) -> QualityStatus {
        self.quality_status
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub(crate) fn reserve(&mut self, quantity: i64) -> Result<(), LedgerError> {
        ensure_positive(quantity)?;
        let available = self.available_quantity();
        if available < quantity {
            return Err(LedgerError::InsufficientAvailable {
                key: self.key.clone(),
                requested: quantity,
                available,
            });
        }
        self.reserved_quantity = self.checked(self.reserved_quantity.checked_add(quantity), "reserve")?;
        Ok(())
    }

    pub(crate) fn release(&mut self, quantity: i64) -> Result<(), LedgerError> {
        ensure_positive(quantity)?;
        self.reserved_quantity = (self.reserved_quantity - quantity).max(0);
        Ok(())
    }

    pub(crate) fn receive(
        &mut self,
        quantity: i64,
        unit_cost: Decimal,
        location_code: Option<&str>,
        quality_status: QualityStatus,
    ) -> Result<(), LedgerError> {
        ensure_positive(quantity)?;
        if unit_cost.is_sign_negative() {
            return Err(LedgerError::NegativeUnitCost(unit_cost));
        }

        let current = self.checked(self.current_quantity.checked_add(quantity), "receive")?;

        // Moving weighted average over what is physically on hand.
        let on_hand = Decimal::from(self.current_quantity.max(0));
        let incoming = Decimal::from(quantity);
        let value = on_hand
            .checked_mul(self.unit_cost)
            .zip(incoming.checked_mul(unit_cost))
            .and_then(|(held, added)| held.checked_add(added));
        let total = on_hand.checked_add(incoming);
        let average = value
            .zip(total)
            .and_then(|(value, total)| value.checked_div(total));
        self.unit_cost = self.checked(average, "receive cost")?.round_dp(4);

        self.current_quantity = current;
        self.quality_status = quality_status;
        if let Some(loc) = location_code.filter(|l| !l.trim().is_empty()) {
            self.location_code = Some(loc.to_string());
        }
        Ok(())
    }

    pub(crate) fn transfer_out(&mut self, quantity: i64) -> Result<(), LedgerError> {
        ensure_positive(quantity)?;
        let available = self.available_quantity();
        if available < quantity {
            return Err(LedgerError::InsufficientAvailable {
                key: self.key.clone(),
                requested: quantity,
                available,
            });
        }
        let in_transit = self.checked(self.in_transit_quantity.checked_add(quantity), "transfer out")?;
        self.current_quantity -= quantity;
        self.in_transit_quantity = in_transit;
        Ok(())
    }

    pub(crate) fn clear_in_transit(&mut self, quantity: i64) -> Result<(), LedgerError> {
        ensure_positive(quantity)?;
        if self.in_transit_quantity < quantity {
            return Err(LedgerError::InsufficientInTransit {
                key: self.key.clone(),
                requested: quantity,
                in_transit: self.in_transit_quantity,
            });
        }
        self.in_transit_quantity -= quantity;
        Ok(())
    }

    pub(crate) fn transfer_in(
        &mut self,
        quantity: i64,
        unit_cost: Decimal,
        location_code: Option<&str>,
    ) -> Result<(), LedgerError> {
        // Stock arriving from another warehouse keeps its quality status.
        let quality = self.quality_status;
        self.receive(quantity, unit_cost, location_code, quality)
    }

    pub(crate) fn reverse_transfer_out(&mut self, quantity: i64) -> Result<(), LedgerError> {
        let current = self.checked(self.current_quantity.checked_add(quantity), "reverse transfer")?;
        self.clear_in_transit(quantity)?;
        self.current_quantity = current;
        Ok(())
    }

    pub(crate) fn adjust(&mut self, delta: i64) -> Result<(), LedgerError> {
        if delta == 0 {
            return Err(LedgerError::ZeroDelta(self.key.clone()));
        }
        let next = self.checked(self.current_quantity.checked_add(delta), "adjust")?;
        if next < 0 || next < self.reserved_quantity {
            return Err(LedgerError::AdjustmentBelowReserved {
                key: self.key.clone(),
                delta,
                current: self.current_quantity,
                reserved: self.reserved_quantity,
            });
        }
        self.current_quantity = next;
        Ok(())
    }

    fn checked<T>(&self, value: Option<T>, operation: &'static str) -> Result<T, LedgerError> {
        value.ok_or_else(|| LedgerError::Overflow {
            key: self.key.clone(),
            operation,
        })
    }
}

fn ensure_positive(quantity: i64) -> Result<(), LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::NonPositiveQuantity(quantity));
    }
    Ok(())
}
