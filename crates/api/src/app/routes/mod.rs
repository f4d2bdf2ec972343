use axum::Router;

pub mod common;
pub mod count_plans;
pub mod inbound_orders;
pub mod inventory;
pub mod system;
pub mod transfer_orders;

/// Router for every business endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/inbound-orders", inbound_orders::router())
        .nest("/transfer-orders", transfer_orders::router())
        .nest("/count-plans", count_plans::router())
        .nest("/inventory", inventory::router())
}
