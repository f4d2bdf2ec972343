//! Warehouse HTTP surface.
//!
//! Handlers live in `routes/`, one module per document type. They turn
//! `dto` request bodies into workflow commands, hand them to
//! `AppServices::dispatch` and render the outcome (or an `errors` mapping)
//! inside the `{success, data, message}` envelope.

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Router with request logging and the shared services attached.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(Extension(services)),
        )
}
