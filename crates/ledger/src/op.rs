//! Ledger operations and the movement journal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::WarehouseId;

use crate::record::{QualityStatus, StockKey};

/// One ledger primitive. A batch of ops is committed all-or-nothing by
/// [`crate::InventoryLedger::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    Reserve {
        key: StockKey,
        quantity: i64,
    },
    Release {
        key: StockKey,
        quantity: i64,
    },
    Receive {
        key: StockKey,
        quantity: i64,
        unit_cost: Decimal,
        location_code: Option<String>,
        quality_status: QualityStatus,
    },
    BeginTransferOut {
        key: StockKey,
        quantity: i64,
    },
    CompleteTransferIn {
        from: StockKey,
        to_warehouse: WarehouseId,
        quantity: i64,
        location_code: Option<String>,
    },
    ReverseTransferOut {
        key: StockKey,
        quantity: i64,
    },
    Adjust {
        key: StockKey,
        delta: i64,
    },
}

impl LedgerOp {
    /// Every row the op touches.
    pub fn keys(&self) -> Vec<StockKey> {
        match self {
            LedgerOp::Reserve { key, .. }
            | LedgerOp::Release { key, .. }
            | LedgerOp::Receive { key, .. }
            | LedgerOp::BeginTransferOut { key, .. }
            | LedgerOp::ReverseTransferOut { key, .. }
            | LedgerOp::Adjust { key, .. } => vec![key.clone()],
            LedgerOp::CompleteTransferIn {
                from, to_warehouse, ..
            } => vec![from.clone(), from.in_warehouse(*to_warehouse)],
        }
    }

    /// Ops that undo this one, used to compensate a committed batch whose
    /// owning workflow event could not be persisted.
    ///
    /// `Receive` is undone by a negative adjustment, so the moving average
    /// cost is not restored.
    pub fn inverse(&self) -> Vec<LedgerOp> {
        match self {
            LedgerOp::Reserve { key, quantity } => vec![LedgerOp::Release {
                key: key.clone(),
                quantity: *quantity,
            }],
            LedgerOp::Release { key, quantity } => vec![LedgerOp::Reserve {
                key: key.clone(),
                quantity: *quantity,
            }],
            LedgerOp::Receive { key, quantity, .. } => vec![LedgerOp::Adjust {
                key: key.clone(),
                delta: -*quantity,
            }],
            LedgerOp::BeginTransferOut { key, quantity } => vec![LedgerOp::ReverseTransferOut {
                key: key.clone(),
                quantity: *quantity,
            }],
            LedgerOp::ReverseTransferOut { key, quantity } => vec![LedgerOp::BeginTransferOut {
                key: key.clone(),
                quantity: *quantity,
            }],
            LedgerOp::CompleteTransferIn {
                from,
                to_warehouse,
                quantity,
                ..
            } => vec![
                LedgerOp::Adjust {
                    key: from.in_warehouse(*to_warehouse),
                    delta: -*quantity,
                },
                LedgerOp::Adjust {
                    key: from.clone(),
                    delta: *quantity,
                },
                LedgerOp::BeginTransferOut {
                    key: from.clone(),
                    quantity: *quantity,
                },
            ],
            LedgerOp::Adjust { key, delta } => vec![LedgerOp::Adjust {
                key: key.clone(),
                delta: -*delta,
            }],
        }
    }

    pub fn kind(&self) -> MovementKind {
        match self {
            LedgerOp::Reserve { .. } => MovementKind::Reserve,
            LedgerOp::Release { .. } => MovementKind::Release,
            LedgerOp::Receive { .. } => MovementKind::Receive,
            LedgerOp::BeginTransferOut { .. } => MovementKind::TransferOut,
            LedgerOp::CompleteTransferIn { .. } => MovementKind::TransferIn,
            LedgerOp::ReverseTransferOut { .. } => MovementKind::TransferReversed,
            LedgerOp::Adjust { .. } => MovementKind::Adjust,
        }
    }
}

/// Inverse of a whole batch, in reverse order.
pub fn compensation_for(ops: &[LedgerOp]) -> Vec<LedgerOp> {
    ops.iter().rev().flat_map(LedgerOp::inverse).collect()
}

/// Implemented by workflow events: the ledger movements an event implies.
///
/// Events with no ledger effect return an empty list.
pub trait LedgerEffect {
    fn ledger_ops(&self) -> Vec<LedgerOp>;

    /// Document number recorded as the journal reference.
    fn document_number(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Reserve,
    Release,
    Receive,
    TransferOut,
    TransferIn,
    TransferReversed,
    Adjust,
}

/// Journal entry: the net change one op made to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub key: StockKey,
    pub kind: MovementKind,
    pub current_delta: i64,
    pub reserved_delta: i64,
    pub in_transit_delta: i64,
    /// Document that caused the movement (e.g. an order number).
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}
