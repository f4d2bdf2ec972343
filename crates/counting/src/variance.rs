//! Variance math and the adjustment engine.
//!
//! Everything here is a pure function of its inputs.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use stockflow_core::{ItemId, ValueObject, WarehouseId};
use stockflow_ledger::{LedgerOp, StockKey};

use crate::plan::{CountRecord, CountRecordStatus};

/// Difference between counted and booked quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variance {
    /// `actual - book`.
    pub quantity: i64,
    /// `quantity / book * 100`, two decimal places. `None` when nothing was booked.
    pub rate: Option<Decimal>,
}

impl ValueObject for Variance {}

impl Variance {
    pub fn compute(book: i64, actual: i64) -> Self {
        let quantity = actual - book;
        let rate = (book != 0).then(|| {
            (Decimal::from(quantity) * Decimal::ONE_HUNDRED / Decimal::from(book))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        });
        Self { quantity, rate }
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }
}

/// What `complete` does with records nobody counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Treat uncounted records as matching the books (zero variance).
    #[default]
    BookQuantity,
    /// Refuse to complete while any record is uncounted.
    RequireAll,
}

/// Correction for one count record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub record_id: u32,
    pub item_id: ItemId,
    pub batch_number: Option<String>,
    pub delta: i64,
}

/// One adjustment per counted record with a non-zero variance.
///
/// Records already `adjusted` are skipped.
pub fn adjustments(records: &[CountRecord]) -> Vec<Adjustment> {
    records
        .iter()
        .filter(|r| r.status == CountRecordStatus::Counted)
        .filter_map(|r| {
            let variance = r.variance()?;
            (!variance.is_zero()).then(|| Adjustment {
                record_id: r.record_id,
                item_id: r.item_id,
                batch_number: r.batch_number.clone(),
                delta: variance.quantity,
            })
        })
        .collect()
}

/// Ledger deltas for a set of adjustments in one warehouse.
pub fn adjustment_ops(warehouse_id: WarehouseId, adjustments: &[Adjustment]) -> Vec<LedgerOp> {
    adjustments
        .iter()
        .map(|a| LedgerOp::Adjust {
            key: StockKey::new(warehouse_id, a.item_id, a.batch_number.clone()),
            delta: a.delta,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shortage_of_twenty_on_two_hundred() {
        let v = Variance::compute(200, 180);
        assert_eq!(v.quantity, -20);
        assert_eq!(v.rate, Some(dec!(-10.00)));
    }

    #[test]
    fn rate_is_undefined_without_book_quantity() {
        let v = Variance::compute(0, 7);
        assert_eq!(v.quantity, 7);
        assert_eq!(v.rate, None);
    }

    #[test]
    fn rate_rounds_half_away_from_zero() {
        // 1/32 of the book is 3.125%.
        assert_eq!(Variance::compute(3, 4).rate, Some(dec!(33.33)));
        assert_eq!(Variance::compute(32, 33).rate, Some(dec!(3.13)));
        assert_eq!(Variance::compute(32, 31).rate, Some(dec!(-3.13)));
    }

    #[test]
    fn only_counted_non_zero_records_produce_ops() {
        let w = WarehouseId::new();
        let record = |id, book, actual: Option<i64>, status| CountRecord {
            record_id: id,
            item_id: ItemId::new(),
            batch_number: None,
            location_code: None,
            book_quantity: book,
            actual_quantity: actual,
            status,
        };
        let records = vec![
            record(1, 200, Some(180), CountRecordStatus::Counted),
            record(2, 10, Some(10), CountRecordStatus::Counted),
            record(3, 10, None, CountRecordStatus::Pending),
            record(4, 5, Some(9), CountRecordStatus::Adjusted),
        ];
        let found = adjustments(&records);
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].record_id, found[0].delta), (1, -20));

        let ops = adjustment_ops(w, &found);
        match &ops[..] {
            [LedgerOp::Adjust { key, delta }] => {
                assert_eq!(key.warehouse_id, w);
                assert_eq!(key.item_id, records[0].item_id);
                assert_eq!(*delta, -20);
            }
            other => panic!("Expected one Adjust, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: variance is a pure function of (book, actual).
        #[test]
        fn variance_is_deterministic(book in 0i64..1_000_000, actual in 0i64..1_000_000) {
            let a = Variance::compute(book, actual);
            let b = Variance::compute(book, actual);
            prop_assert_eq!(a, b);
            prop_assert_eq!(a.quantity, actual - book);
            prop_assert_eq!(a.rate.is_none(), book == 0);
            if let Some(rate) = a.rate {
                prop_assert!(rate.scale() <= 2);
                if !rate.is_zero() {
                    prop_assert_eq!(rate.is_sign_negative(), a.quantity < 0);
                }
            }
        }
    }
}
