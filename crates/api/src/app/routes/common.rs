use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde_json::Value as JsonValue;

use stockor_core::{Configuration, TenantId};
use stockor_inventory::{Location, LocationId};

use crate::app::errors;
use crate::app::services::AppServices;

/// Handlers build their reply with `?` and fold the error side back in.
pub type HandlerResult = Result<Response, Response>;

pub fn finish(result: HandlerResult) -> Response {
    result.unwrap_or_else(|err| err)
}

pub fn ok(body: JsonValue) -> HandlerResult {
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub fn created(body: JsonValue) -> HandlerResult {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Another record of `model` already uses `code`.
pub fn duplicate_code(model: &str, code: &str) -> Response {
    errors::json_error(
        StatusCode::CONFLICT,
        "conflict",
        format!("{model} code {} is already taken", code.trim().to_ascii_uppercase()),
    )
}

/// A location by id, else by code, else the configured default location.
pub fn resolve_location(
    services: &AppServices,
    tenant_id: TenantId,
    id: Option<LocationId>,
    code: Option<&str>,
) -> Result<Location, Response> {
    let locations = &services.read_models.locations;
    let found = match (id, code) {
        (Some(id), _) => locations.get(tenant_id, &id),
        (None, Some(code)) => locations.find(tenant_id, |l| l.code().eq_ignore_ascii_case(code.trim())),
        (None, None) => {
            let default = Configuration::global().default_location_code().to_string();
            locations.find(tenant_id, |l| l.code() == default)
        }
    };
    found.ok_or_else(|| errors::not_found("location"))
}

/// Export each record for `model`, dropping nothing but what `user` may not read.
pub fn exported_list<T: serde::Serialize>(
    services: &AppServices,
    model: &str,
    records: &[T],
    user: &dyn stockor_auth::ModelAccess,
) -> Result<JsonValue, Response> {
    records
        .iter()
        .map(|record| crate::app::dto::exported(services, model, record, user))
        .collect::<Result<Vec<_>, _>>()
        .map(JsonValue::Array)
}
