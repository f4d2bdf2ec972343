//! Service wiring: event store, ledger, dispatcher, read models and the
//! reference gateway, shared by every handler.

use std::sync::Arc;

use chrono::Utc;

use stockflow_core::AggregateId;
use stockflow_counting::{CountPlan, SnapshotRow};
use stockflow_infra::event_store::{InMemoryEventStore, StoredEvent};
use stockflow_infra::{
    CommandDispatcher, DispatchError, Dispatched, DocumentKind, DocumentNumberer,
    SharedProjection, Workflow, WorkflowProjection,
};
use stockflow_inbound::InboundOrder;
use stockflow_ledger::{InventoryFilter, InventoryLedger};
use stockflow_reference::{CachedReferenceData, ReferenceData};
use stockflow_transfer::TransferOrder;

use crate::config::ApiConfig;

pub type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>>;

pub struct AppServices {
    dispatcher: Dispatcher,
    reference: Arc<dyn ReferenceData>,
    numbers: DocumentNumberer,
    inbound_orders: Arc<WorkflowProjection<InboundOrder>>,
    transfer_orders: Arc<WorkflowProjection<TransferOrder>>,
    count_plans: Arc<WorkflowProjection<CountPlan>>,
}

pub fn build_services(config: &ApiConfig, reference: Arc<dyn ReferenceData>) -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let ledger = Arc::new(InventoryLedger::with_lock_policy(config.lock_policy));

    let inbound_orders = Arc::new(WorkflowProjection::<InboundOrder>::in_memory());
    let transfer_orders = Arc::new(WorkflowProjection::<TransferOrder>::in_memory());
    let count_plans = Arc::new(WorkflowProjection::<CountPlan>::in_memory());

    let dispatcher = CommandDispatcher::new(store, ledger)
        .with_attempts(config.dispatch_attempts)
        .with_projection(inbound_orders.clone() as SharedProjection)
        .with_projection(transfer_orders.clone() as SharedProjection)
        .with_projection(count_plans.clone() as SharedProjection);

    AppServices {
        dispatcher,
        reference: Arc::new(CachedReferenceData::new(reference)),
        numbers: DocumentNumberer::new(),
        inbound_orders,
        transfer_orders,
        count_plans,
    }
}

impl AppServices {
    pub fn dispatch<A: Workflow>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Dispatched<A>, DispatchError> {
        self.dispatcher.dispatch::<A>(aggregate_id, command)
    }

    pub fn next_number(&self, kind: DocumentKind) -> String {
        self.numbers.next(kind, Utc::now())
    }

    pub fn reference(&self) -> &dyn ReferenceData {
        self.reference.as_ref()
    }

    pub fn ledger(&self) -> &InventoryLedger {
        self.dispatcher.ledger()
    }

    pub fn inbound_orders(&self) -> &WorkflowProjection<InboundOrder> {
        &self.inbound_orders
    }

    pub fn transfer_orders(&self) -> &WorkflowProjection<TransferOrder> {
        &self.transfer_orders
    }

    pub fn count_plans(&self) -> &WorkflowProjection<CountPlan> {
        &self.count_plans
    }

    /// Audit trail of one document, or `None` if no document of type `A` has
    /// this id. Deleted inbound orders keep their history.
    pub fn history<A: Workflow>(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<Vec<StoredEvent>>, DispatchError> {
        let history = self.dispatcher.history(aggregate_id)?;
        match history.first() {
            Some(first) if first.aggregate_type == A::AGGREGATE_TYPE => Ok(Some(history)),
            _ => Ok(None),
        }
    }

    /// Book quantities of every ledger row in the plan's warehouse. The plan
    /// narrows this to its own scope when it starts.
    pub fn count_snapshot(&self, plan: &CountPlan) -> Result<Vec<SnapshotRow>, DispatchError> {
        let Some(warehouse_id) = plan.warehouse_id() else {
            return Ok(vec![]);
        };
        let rows = self
            .ledger()
            .query(&InventoryFilter::for_warehouse(warehouse_id))?;
        Ok(rows
            .into_iter()
            .map(|row| SnapshotRow {
                item_id: row.item_id(),
                batch_number: row.batch_number().map(str::to_string),
                location_code: row.location_code().map(str::to_string),
                current_quantity: row.current_quantity(),
            })
            .collect())
    }
}
