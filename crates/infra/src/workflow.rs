//! Binding between the workflow aggregates and the generic infrastructure.

use serde::Serialize;
use serde::de::DeserializeOwned;

use stockflow_core::{Aggregate, AggregateId, DomainError};
use stockflow_counting::{CountPlan, CountPlanId};
use stockflow_events::Event;
use stockflow_inbound::{InboundOrder, InboundOrderId};
use stockflow_ledger::LedgerEffect;
use stockflow_transfer::{TransferOrder, TransferOrderId};

/// An event-sourced workflow document the dispatcher and projections can
/// drive without knowing its concrete type.
pub trait Workflow:
    Aggregate<
        Error = DomainError,
        Event: Event + LedgerEffect + Serialize + DeserializeOwned,
    > + Clone
    + Send
    + Sync
    + 'static
{
    /// Stream type tag (e.g. "inbound.order").
    const AGGREGATE_TYPE: &'static str;

    /// Fresh instance for rehydration.
    fn for_id(id: AggregateId) -> Self;

    /// Created and not deleted.
    fn is_live(&self) -> bool;
}

impl Workflow for InboundOrder {
    const AGGREGATE_TYPE: &'static str = "inbound.order";

    fn for_id(id: AggregateId) -> Self {
        InboundOrder::empty(InboundOrderId::new(id))
    }

    fn is_live(&self) -> bool {
        self.exists()
    }
}

impl Workflow for TransferOrder {
    const AGGREGATE_TYPE: &'static str = "transfer.order";

    fn for_id(id: AggregateId) -> Self {
        TransferOrder::empty(TransferOrderId::new(id))
    }

    fn is_live(&self) -> bool {
        self.exists()
    }
}

impl Workflow for CountPlan {
    const AGGREGATE_TYPE: &'static str = "counting.plan";

    fn for_id(id: AggregateId) -> Self {
        CountPlan::empty(CountPlanId::new(id))
    }

    fn is_live(&self) -> bool {
        self.exists()
    }
}
