//! Inventory ledger: quantities per (warehouse, item, batch) and the
//! transactional primitives every workflow goes through.

pub mod error;
pub mod ledger;
pub mod op;
pub mod record;

pub use error::LedgerError;
pub use ledger::{InventoryFilter, InventoryLedger, LockPolicy, MovementFilter, MANUAL_REFERENCE};
pub use op::{LedgerEffect, LedgerOp, MovementKind, StockMovement, compensation_for};
pub use record::{InventoryRecord, InventoryStatus, QualityStatus, StockKey};
