//! Physical stock counts: count plans, variance math and ledger adjustments.

pub mod plan;
pub mod variance;

pub use plan::{
    ActualRecorded, ApplyAdjustments, CancelCount, CompleteCount, CountAdjusted, CountPlan,
    CountPlanCommand, CountPlanEvent, CountPlanId, CountPlanStatus, CountRecord,
    CountRecordStatus, CountScope, CreateCountPlan, RecordActual, SnapshotRow, StartCount,
};
pub use variance::{Adjustment, FillPolicy, Variance, adjustment_ops, adjustments};
