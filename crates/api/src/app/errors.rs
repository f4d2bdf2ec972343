use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockflow_core::DomainError;
use stockflow_infra::DispatchError;

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidTransition(_)
        | DomainError::AlreadyAdjusted
        | DomainError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        DomainError::InsufficientAvailable(_) | DomainError::IncompleteCount { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    json_error(status_for(&err), err.to_string())
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err.domain_error() {
        Some(domain) => domain_error_to_response(domain),
        None => {
            tracing::error!(error = %err, "command failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Malformed or mistyped request bodies are a validation failure.
pub fn body_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

pub fn not_found(what: impl core::fmt::Display) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, format!("{what} not found"))
}

/// Failure envelope: `{ "success": false, "message": ... }`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "message": message.into(),
        })),
    )
        .into_response()
}
