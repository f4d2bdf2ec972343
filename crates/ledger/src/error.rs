use rust_decimal::Decimal;
use thiserror::Error;

use stockflow_core::DomainError;

use crate::record::StockKey;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{key}: requested {requested}, available {available}")]
    InsufficientAvailable {
        key: StockKey,
        requested: i64,
        available: i64,
    },

    #[error("{key}: requested {requested} from transit, in transit {in_transit}")]
    InsufficientInTransit {
        key: StockKey,
        requested: i64,
        in_transit: i64,
    },

    #[error("{key}: adjustment {delta} would leave current {current} below reserved {reserved}")]
    AdjustmentBelowReserved {
        key: StockKey,
        delta: i64,
        current: i64,
        reserved: i64,
    },

    #[error("{0}: adjustment delta cannot be zero")]
    ZeroDelta(StockKey),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    #[error("unit cost cannot be negative, got {0}")]
    NegativeUnitCost(Decimal),

    /// A quantity or stock value left the representable range.
    #[error("{key}: {operation} overflows the stock quantity or value range")]
    Overflow {
        key: StockKey,
        operation: &'static str,
    },

    #[error("no inventory record for {0}")]
    UnknownRecord(StockKey),

    /// A row lock could not be taken within the lock policy.
    #[error("lock contention on {0}")]
    Contention(StockKey),

    #[error("ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention(_))
    }
}

impl From<LedgerError> for DomainError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientAvailable { .. }
            | LedgerError::InsufficientInTransit { .. }
            | LedgerError::AdjustmentBelowReserved { .. } => {
                DomainError::InsufficientAvailable(value.to_string())
            }
            LedgerError::ZeroDelta(_)
            | LedgerError::NonPositiveQuantity(_)
            | LedgerError::NegativeUnitCost(_)
            | LedgerError::Overflow { .. } => DomainError::Validation(value.to_string()),
            LedgerError::UnknownRecord(key) => DomainError::NotFound(format!("inventory record {key}")),
            LedgerError::Contention(_) | LedgerError::Poisoned => {
                DomainError::ConcurrencyConflict(value.to_string())
            }
        }
    }
}
