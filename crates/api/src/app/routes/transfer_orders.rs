use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use stockflow_core::{AggregateId, DomainResult, WarehouseId};
use stockflow_infra::DocumentKind;
use stockflow_reference::require_warehouse;
use stockflow_transfer::{
    CancelTransferOrder, ConfirmTransferOrder, CreateTransferOrder, ExecuteTransferOrder,
    ReceiveTransferOrder, TransferOrder, TransferOrderCommand, TransferOrderId,
};

use crate::app::routes::common::{self, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/execute", post(execute_order))
        .route("/:id/receive", post(receive_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/history", get(order_history))
}

/// `warehouse_id` matches either end of the transfer.
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::DocumentListQuery>,
) -> axum::response::Response {
    let warehouse: Option<WarehouseId> = match dto::parse_optional(query.warehouse_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let refs = services.reference();
    let orders: Vec<_> = services
        .transfer_orders()
        .list()
        .iter()
        .filter(|o| {
            warehouse.is_none_or(|w| {
                o.from_warehouse_id() == Some(w) || o.to_warehouse_id() == Some(w)
            })
        })
        .filter(|o| {
            query
                .status
                .as_deref()
                .is_none_or(|s| dto::status_matches(o.status(), s))
        })
        .map(|o| dto::transfer_order_to_json(o, refs))
        .collect();

    dto::ok(StatusCode::OK, json!(orders))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateTransferOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match common::body(body) {
        Ok(b) => b,
        Err(res) => return res,
    };

    let agg = AggregateId::new();
    let cmd = match create_command(&services, agg, body) {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };
    common::run::<TransferOrder>(&services, agg, cmd, StatusCode::CREATED, dto::transfer_order_to_json)
}

fn create_command(
    services: &AppServices,
    agg: AggregateId,
    body: dto::CreateTransferOrderRequest,
) -> DomainResult<TransferOrderCommand> {
    let refs = services.reference();
    let from_warehouse_id: WarehouseId = body.from_warehouse_id.trim().parse()?;
    let to_warehouse_id: WarehouseId = body.to_warehouse_id.trim().parse()?;
    require_warehouse(refs, from_warehouse_id)?;
    require_warehouse(refs, to_warehouse_id)?;
    let lines = dto::transfer_lines(body.lines, refs)?;

    Ok(TransferOrderCommand::Create(CreateTransferOrder {
        order_id: TransferOrderId::new(agg),
        transfer_number: services.next_number(DocumentKind::TransferOrder),
        from_warehouse_id,
        to_warehouse_id,
        remark: body.remark,
        lines,
        occurred_at: Utc::now(),
    }))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.transfer_orders().get(agg) {
        Some(order) => dto::ok(
            StatusCode::OK,
            dto::transfer_order_to_json(&order, services.reference()),
        ),
        None => errors::not_found(format!("transfer order {agg}")),
    }
}

pub async fn confirm_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = TransferOrderCommand::Confirm(ConfirmTransferOrder {
        order_id: TransferOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    common::run::<TransferOrder>(&services, agg, cmd, StatusCode::OK, dto::transfer_order_to_json)
}

pub async fn execute_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = TransferOrderCommand::Execute(ExecuteTransferOrder {
        order_id: TransferOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    common::run::<TransferOrder>(&services, agg, cmd, StatusCode::OK, dto::transfer_order_to_json)
}

pub async fn receive_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = TransferOrderCommand::Receive(ReceiveTransferOrder {
        order_id: TransferOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    common::run::<TransferOrder>(&services, agg, cmd, StatusCode::OK, dto::transfer_order_to_json)
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::CancelRequest>, JsonRejection>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body = match common::body(body) {
        Ok(b) => b,
        Err(res) => return res,
    };

    let cmd = TransferOrderCommand::Cancel(CancelTransferOrder {
        order_id: TransferOrderId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    common::run::<TransferOrder>(&services, agg, cmd, StatusCode::OK, dto::transfer_order_to_json)
}

pub async fn order_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::history::<TransferOrder>(&services, &id, "transfer order")
}
