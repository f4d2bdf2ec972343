//! Helpers shared by the workflow handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value as JsonValue;

use stockflow_core::{AggregateId, DomainError};
use stockflow_infra::Workflow;
use stockflow_reference::ReferenceData;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.trim().parse().map_err(errors::domain_error_to_response)
}

pub fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(b)| b).map_err(errors::body_rejection_to_response)
}

/// Dispatch a transition and render the resulting document.
pub fn run<A: Workflow>(
    services: &AppServices,
    aggregate_id: AggregateId,
    command: A::Command,
    status: StatusCode,
    view: impl Fn(&A, &dyn ReferenceData) -> JsonValue,
) -> Response {
    match services.dispatch::<A>(aggregate_id, command) {
        Ok(done) => dto::ok(status, view(&done.state, services.reference())),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub fn history<A: Workflow>(services: &AppServices, raw_id: &str, what: &str) -> Response {
    let agg: AggregateId = match parse_id(raw_id) {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.history::<A>(agg) {
        Ok(Some(events)) => dto::ok(StatusCode::OK, dto::history_to_json(&events)),
        Ok(None) => errors::not_found(format!("{what} {agg}")),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
