use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    routing::get,
};
use serde_json::json;

use stockflow_core::{DomainResult, ItemId, WarehouseId};
use stockflow_ledger::{InventoryFilter, MovementFilter};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(query_inventory))
        .route("/movements", get(list_movements))
}

pub async fn query_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::InventoryQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let filter = match inventory_filter(&query) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let records = match services.ledger().query(&filter) {
        Ok(records) => records,
        Err(e) => return errors::dispatch_error_to_response(e.into()),
    };
    let refs = services.reference();
    let rows: Vec<_> = records
        .iter()
        .map(|r| dto::inventory_record_to_json(r, refs))
        .collect();

    dto::ok(StatusCode::OK, json!(rows))
}

fn inventory_filter(query: &dto::InventoryQuery) -> DomainResult<InventoryFilter> {
    Ok(InventoryFilter {
        warehouse_id: dto::parse_optional::<WarehouseId>(query.warehouse_id.as_deref())?,
        item_id: dto::parse_optional::<ItemId>(query.item_id.as_deref())?,
        inventory_status: query.status,
        quality_status: query.quality_status,
    })
}

/// Journal of committed ledger movements, oldest first.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::MovementQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::json_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let filter = match movement_filter(query) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let journal = match services.ledger().movements(&filter) {
        Ok(journal) => journal,
        Err(e) => return errors::dispatch_error_to_response(e.into()),
    };
    let movements: Vec<_> = journal
        .iter()
        .map(dto::movement_to_json)
        .collect();

    dto::ok(StatusCode::OK, json!(movements))
}

fn movement_filter(query: dto::MovementQuery) -> DomainResult<MovementFilter> {
    Ok(MovementFilter {
        warehouse_id: dto::parse_optional::<WarehouseId>(query.warehouse_id.as_deref())?,
        item_id: dto::parse_optional::<ItemId>(query.item_id.as_deref())?,
        reference: query.reference.filter(|r| !r.trim().is_empty()),
    })
}
