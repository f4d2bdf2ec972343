//! Inbound (receiving) orders, event-sourced.
//!
//! Pure domain logic: the aggregate decides events, and executed orders carry
//! the ledger receipts the dispatcher commits alongside them.

pub mod approval;
pub mod order;

pub use approval::{ApprovalDecision, ApprovalGate, ApprovalStatus};
pub use order::{
    CancelInboundOrder, ConfirmInboundOrder, CreateInboundOrder, DeleteInboundOrder,
    EditInboundOrder, ExecuteInboundOrder, InboundOrder, InboundOrderCommand, InboundOrderEvent,
    InboundOrderId, InboundOrderLine, InboundOrderStatus, KeyAssignment, LineInput,
    ReviewInboundOrder,
};
