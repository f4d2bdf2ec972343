//! Transfer orders: relocating stock between warehouses, event-sourced.

pub mod order;

pub use order::{
    CancelTransferOrder, ConfirmTransferOrder, CreateTransferOrder, ExecuteTransferOrder,
    ReceiveTransferOrder, TransferLegs, TransferLineInput, TransferOrder,
    TransferOrderCancelled, TransferOrderCommand, TransferOrderCreated, TransferOrderEvent,
    TransferOrderId, TransferOrderLine, TransferOrderStatus,
};
