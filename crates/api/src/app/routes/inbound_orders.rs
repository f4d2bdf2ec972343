use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use stockflow_core::{AggregateId, DomainResult, EmployeeId, WarehouseId};
use stockflow_inbound::{
    CancelInboundOrder, ConfirmInboundOrder, CreateInboundOrder, DeleteInboundOrder,
    EditInboundOrder, ExecuteInboundOrder, InboundOrder, InboundOrderCommand, InboundOrderEvent,
    InboundOrderId, ReviewInboundOrder,
};
use stockflow_infra::DocumentKind;
use stockflow_reference::{ReferenceData, require_employee, require_warehouse};

use crate::app::routes::common::{self, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(edit_order).delete(delete_order))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/approve", post(review_order))
        .route("/:id/execute", post(execute_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/history", get(order_history))
}

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
        .inbound_orders()
        .list()
        .iter()
        .filter(|o| warehouse.is_none_or(|w| o.warehouse_id() == Some(w)))
        .filter(|o| {
            query
                .status
                .as_deref()
                .is_none_or(|s| dto::status_matches(o.status(), s))
        })
        .map(|o| dto::inbound_order_to_json(o, refs))
        .collect();

    dto::ok(StatusCode::OK, json!(orders))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateInboundOrderRequest>, JsonRejection>,
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

    match services.dispatch::<InboundOrder>(agg, cmd) {
        Ok(done) => {
            let mut data = dto::inbound_order_to_json(&done.state, services.reference());
            data["assigned"] = assigned(&done.events);
            dto::ok(StatusCode::CREATED, data)
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn create_command(
    services: &AppServices,
    agg: AggregateId,
    body: dto::CreateInboundOrderRequest,
) -> DomainResult<InboundOrderCommand> {
    let refs = services.reference();
    let warehouse_id: WarehouseId = body.warehouse_id.trim().parse()?;
    require_warehouse(refs, warehouse_id)?;
    let lines = dto::inbound_lines(body.lines, refs)?;

    Ok(InboundOrderCommand::Create(CreateInboundOrder {
        order_id: InboundOrderId::new(agg),
        order_number: services.next_number(DocumentKind::InboundOrder),
        warehouse_id,
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

    match services.inbound_orders().get(agg) {
        Some(order) => dto::ok(
            StatusCode::OK,
            dto::inbound_order_to_json(&order, services.reference()),
        ),
        None => errors::not_found(format!("inbound order {agg}")),
    }
}

pub async fn edit_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::EditInboundOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body = match common::body(body) {
        Ok(b) => b,
        Err(res) => return res,
    };

    let cmd = match edit_command(services.reference(), agg, body) {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.dispatch::<InboundOrder>(agg, cmd) {
        Ok(done) => {
            let mut data = dto::inbound_order_to_json(&done.state, services.reference());
            data["assigned"] = assigned(&done.events);
            dto::ok(StatusCode::OK, data)
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn edit_command(
    refs: &dyn ReferenceData,
    agg: AggregateId,
    body: dto::EditInboundOrderRequest,
) -> DomainResult<InboundOrderCommand> {
    let warehouse_id: Option<WarehouseId> = dto::parse_optional(body.warehouse_id.as_deref())?;
    if let Some(w) = warehouse_id {
        require_warehouse(refs, w)?;
    }
    let lines = body
        .lines
        .map(|lines| dto::inbound_lines(lines, refs))
        .transpose()?;

    Ok(InboundOrderCommand::Edit(EditInboundOrder {
        order_id: InboundOrderId::new(agg),
        warehouse_id,
        remark: body.remark,
        lines,
        occurred_at: Utc::now(),
    }))
}

pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = InboundOrderCommand::Delete(DeleteInboundOrder {
        order_id: InboundOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    match services.dispatch::<InboundOrder>(agg, cmd) {
        Ok(_) => dto::ok_message(format!("inbound order {agg} deleted")),
        Err(e) => errors::dispatch_error_to_response(e),
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

    let cmd = InboundOrderCommand::Confirm(ConfirmInboundOrder {
        order_id: InboundOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    common::run::<InboundOrder>(&services, agg, cmd, StatusCode::OK, dto::inbound_order_to_json)
}

pub async fn review_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::ReviewRequest>, JsonRejection>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body = match common::body(body) {
        Ok(b) => b,
        Err(res) => return res,
    };

    let reviewer_id: Option<EmployeeId> = match dto::parse_optional(body.reviewer_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    if let Some(reviewer) = reviewer_id {
        if let Err(e) = require_employee(services.reference(), reviewer) {
            return errors::domain_error_to_response(e);
        }
    }

    let cmd = InboundOrderCommand::Review(ReviewInboundOrder {
        order_id: InboundOrderId::new(agg),
        decision: body.decision,
        reviewer_id,
        comment: body.comment,
        occurred_at: Utc::now(),
    });
    common::run::<InboundOrder>(&services, agg, cmd, StatusCode::OK, dto::inbound_order_to_json)
}

pub async fn execute_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = InboundOrderCommand::Execute(ExecuteInboundOrder {
        order_id: InboundOrderId::new(agg),
        occurred_at: Utc::now(),
    });
    common::run::<InboundOrder>(&services, agg, cmd, StatusCode::OK, dto::inbound_order_to_json)
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

    let cmd = InboundOrderCommand::Cancel(CancelInboundOrder {
        order_id: InboundOrderId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    common::run::<InboundOrder>(&services, agg, cmd, StatusCode::OK, dto::inbound_order_to_json)
}

pub async fn order_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::history::<InboundOrder>(&services, &id, "inbound order")
}

fn assigned(events: &[InboundOrderEvent]) -> serde_json::Value {
    events
        .iter()
        .find_map(|e| match e {
            InboundOrderEvent::Created(c) => Some(c.assigned.as_slice()),
            InboundOrderEvent::Edited(e) => Some(e.assigned.as_slice()),
            _ => None,
        })
        .map(dto::assignments_to_json)
        .unwrap_or_else(|| json!([]))
}
