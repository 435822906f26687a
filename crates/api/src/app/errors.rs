use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockor_export::ExportError;
use stockor_infra::{AllocationError, DispatchError};

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => internal("store_error", e),
        DispatchError::Publish(msg) => internal("publish_error", msg),
    }
}

pub fn allocation_error_to_response(err: AllocationError) -> axum::response::Response {
    match err {
        AllocationError::Dispatch(e) => dispatch_error_to_response(e),
        AllocationError::SkuLocNotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("sku_loc {id} not found"))
        }
        AllocationError::Reactions { first, .. } => allocation_error_to_response(*first),
        e @ AllocationError::Decode { .. } => internal("allocation_error", e),
    }
}

pub fn export_error_to_response(err: ExportError) -> axum::response::Response {
    match err {
        ExportError::NotAnObject(_) => json_error(StatusCode::BAD_REQUEST, "invalid_body", err.to_string()),
        other => internal("export_error", other),
    }
}

pub fn not_found(what: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

fn internal(code: &'static str, err: impl std::fmt::Display) -> axum::response::Response {
    tracing::error!(code, error = %err, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
