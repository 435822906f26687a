use std::sync::Arc;

use axum::{Extension, Json, response::Response};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_core::code;
use stockor_infra::aggregate_types;
use stockor_inventory::{CreateLocation, Location, LocationCommand, LocationId};

use super::common::{HandlerResult, created, duplicate_code, exported_list, finish, ok};
use crate::app::dto::{self, CreateLocationRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "location";

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut locations = services.read_models.locations.list(tenant.tenant_id());
        locations.sort_by(|a, b| a.code().cmp(b.code()));
        ok(exported_list(&services, MODEL, &locations, &principal)?)
    })())
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<JsonValue>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let req: CreateLocationRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let wanted = code::normalize(&req.code);
        if services.read_models.locations.find(tenant_id, |l| l.code() == wanted).is_some() {
            return Err(duplicate_code(MODEL, &wanted));
        }

        let location_id = LocationId::generate();
        let cmd = LocationCommand::Create(CreateLocation {
            tenant_id,
            location_id,
            code: req.code,
            name: req.name,
            gl_branch_code: req.gl_branch_code,
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, location_id.aggregate_id(), aggregate_types::LOCATION, cmd, |_, id| {
                Location::empty(LocationId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;

        let location = services
            .read_models
            .locations
            .get(tenant_id, &location_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &location, &principal)?)
    })())
}
