use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::json;

use stockflow_core::{AggregateId, DomainError, DomainResult, EmployeeId, WarehouseId};
use stockflow_counting::{
    ApplyAdjustments, CancelCount, CompleteCount, CountPlan, CountPlanCommand, CountPlanId,
    CreateCountPlan, RecordActual, StartCount,
};
use stockflow_infra::DocumentKind;
use stockflow_reference::{require_employee, require_warehouse};

use crate::app::routes::common::{self, parse_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route("/:id", get(get_plan))
        .route("/:id/start", post(start_plan))
        .route("/:id/records/:record_id", put(record_actual))
        .route("/:id/complete", post(complete_plan))
        .route("/:id/adjust", post(adjust_plan))
        .route("/:id/cancel", post(cancel_plan))
        .route("/:id/history", get(plan_history))
}

pub async fn list_plans(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::DocumentListQuery>,
) -> axum::response::Response {
    let warehouse: Option<WarehouseId> = match dto::parse_optional(query.warehouse_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let refs = services.reference();
    let plans: Vec<_> = services
        .count_plans()
        .list()
        .iter()
        .filter(|p| warehouse.is_none_or(|w| p.warehouse_id() == Some(w)))
        .filter(|p| {
            query
                .status
                .as_deref()
                .is_none_or(|s| dto::status_matches(p.status(), s))
        })
        .map(|p| dto::count_plan_to_json(p, refs))
        .collect();

    dto::ok(StatusCode::OK, json!(plans))
}

pub async fn create_plan(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateCountPlanRequest>, JsonRejection>,
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
    common::run::<CountPlan>(&services, agg, cmd, StatusCode::CREATED, dto::count_plan_to_json)
}

fn create_command(
    services: &AppServices,
    agg: AggregateId,
    body: dto::CreateCountPlanRequest,
) -> DomainResult<CountPlanCommand> {
    let refs = services.reference();
    let warehouse_id: WarehouseId = body.warehouse_id.trim().parse()?;
    let count_person_id: EmployeeId = body.count_person_id.trim().parse()?;
    require_warehouse(refs, warehouse_id)?;
    require_employee(refs, count_person_id)?;
    let scope = dto::count_scope(&body.item_ids, body.location_prefix, refs)?;

    Ok(CountPlanCommand::Create(CreateCountPlan {
        plan_id: CountPlanId::new(agg),
        count_number: services.next_number(DocumentKind::CountPlan),
        warehouse_id,
        count_person_id,
        scope,
        remark: body.remark,
        occurred_at: Utc::now(),
    }))
}

pub async fn get_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.count_plans().get(agg) {
        Some(plan) => dto::ok(StatusCode::OK, dto::count_plan_to_json(&plan, services.reference())),
        None => errors::not_found(format!("count plan {agg}")),
    }
}

/// Book quantities are read from the ledger here; the plan keeps the rows in
/// its scope and rejects the start unless it is still a draft.
pub async fn start_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let Some(plan) = services.count_plans().get(agg) else {
        return errors::not_found(format!("count plan {agg}"));
    };

    let snapshot = match services.count_snapshot(&plan) {
        Ok(rows) => rows,
        Err(e) => return errors::dispatch_error_to_response(e),
    };
    let cmd = CountPlanCommand::Start(StartCount {
        plan_id: CountPlanId::new(agg),
        snapshot,
        occurred_at: Utc::now(),
    });
    common::run::<CountPlan>(&services, agg, cmd, StatusCode::OK, dto::count_plan_to_json)
}

pub async fn record_actual(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, record_id)): Path<(String, String)>,
    body: Result<Json<dto::RecordActualRequest>, JsonRejection>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let record_id: u32 = match record_id.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::domain_error_to_response(DomainError::invalid_id(format!(
                "record id {record_id}"
            )));
        }
    };
    let body = match common::body(body) {
        Ok(b) => b,
        Err(res) => return res,
    };

    let cmd = CountPlanCommand::RecordActual(RecordActual {
        plan_id: CountPlanId::new(agg),
        record_id,
        actual_quantity: body.actual_quantity,
        occurred_at: Utc::now(),
    });
    common::run::<CountPlan>(&services, agg, cmd, StatusCode::OK, dto::count_plan_to_json)
}

/// The body is optional; without one uncounted records take their book
/// quantity.
pub async fn complete_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    let body: dto::CompleteCountRequest = if body.iter().all(u8::is_ascii_whitespace) {
        dto::CompleteCountRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };

    let cmd = CountPlanCommand::Complete(CompleteCount {
        plan_id: CountPlanId::new(agg),
        fill_policy: body.fill_policy,
        occurred_at: Utc::now(),
    });
    common::run::<CountPlan>(&services, agg, cmd, StatusCode::OK, dto::count_plan_to_json)
}

pub async fn adjust_plan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match parse_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let cmd = CountPlanCommand::Adjust(ApplyAdjustments {
        plan_id: CountPlanId::new(agg),
        occurred_at: Utc::now(),
    });
    match services.dispatch::<CountPlan>(agg, cmd) {
        Ok(done) => {
            let mut data = dto::count_plan_to_json(&done.state, services.reference());
            let movements: Vec<_> = done.movements.iter().map(dto::movement_to_json).collect();
            data["movements"] = json!(movements);
            dto::ok(StatusCode::OK, data)
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_plan(
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

    let cmd = CountPlanCommand::Cancel(CancelCount {
        plan_id: CountPlanId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    common::run::<CountPlan>(&services, agg, cmd, StatusCode::OK, dto::count_plan_to_json)
}

pub async fn plan_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    common::history::<CountPlan>(&services, &id, "count plan")
}
