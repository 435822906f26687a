//! Model-level access checks made before a request touches the domain.
//!
//! Attribute-level filtering happens afterwards, in `sanitize_json` and
//! `export_json`.

use axum::http::StatusCode;
use axum::response::Response;

use stockor_auth::{ModelAccess, Principal};

use crate::app::errors;

pub fn require_read(principal: &Principal, model: &str) -> Result<(), Response> {
    if principal.can_read(model) {
        Ok(())
    } else {
        Err(forbidden("read", model))
    }
}

pub fn require_write(principal: &Principal, model: &str) -> Result<(), Response> {
    if principal.can_write(model) {
        Ok(())
    } else {
        Err(forbidden("write", model))
    }
}

fn forbidden(action: &str, model: &str) -> Response {
    tracing::debug!(action, model, "access denied");
    errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("not allowed to {action} {model}"),
    )
}
