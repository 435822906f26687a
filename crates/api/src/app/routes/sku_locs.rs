//! Sku-locs: a sku stocked in a location, with its on-hand qty and the
//! caches the allocator keeps.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use stockor_core::TenantId;
use stockor_infra::aggregate_types;
use stockor_inventory::{AdjustQty, ReceiveQty, SkuLoc, SkuLocCommand, SkuLocId};

use super::common::{HandlerResult, created, exported_list, finish, ok};
use crate::app::dto::{self, AdjustSkuLocRequest, CreateSkuLocRequest, ReceiveRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "sku_loc";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show))
        .route("/:id/adjust", post(adjust))
        .route("/:id/receive", post(receive))
        .route("/:id/allocate", post(allocate))
}

fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<SkuLoc, Response> {
    let id: SkuLocId = dto::parse_id(raw_id, MODEL)?;
    services
        .read_models
        .sku_locs
        .get(tenant_id, &id)
        .ok_or_else(|| errors::not_found(MODEL))
}

fn respond(services: &AppServices, tenant_id: TenantId, id: SkuLocId, user: &stockor_auth::Principal) -> HandlerResult {
    let sku_loc = services
        .read_models
        .sku_locs
        .get(tenant_id, &id)
        .ok_or_else(|| errors::not_found(MODEL))?;
    ok(dto::exported(services, MODEL, &sku_loc.view(), user)?)
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut sku_locs = services.read_models.sku_locs.list(tenant.tenant_id());
        sku_locs.sort_by(|a, b| (a.sku_code(), a.location_code()).cmp(&(b.sku_code(), b.location_code())));
        let views: Vec<_> = sku_locs.iter().map(SkuLoc::view).collect();
        ok(exported_list(&services, MODEL, &views, &principal)?)
    })())
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let sku_loc = load(&services, tenant.tenant_id(), &id)?;
        ok(dto::exported(&services, MODEL, &sku_loc.view(), &principal)?)
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
        let req: CreateSkuLocRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let sku = services
            .read_models
            .skus
            .get(tenant_id, &req.sku_id)
            .ok_or_else(|| errors::not_found("sku"))?;
        let location = services
            .read_models
            .locations
            .get(tenant_id, &req.location_id)
            .ok_or_else(|| errors::not_found("location"))?;

        let sku_loc = services
            .create_sku_loc(tenant_id, &sku, &location, req.bin)
            .map_err(errors::dispatch_error_to_response)?;
        created(dto::exported(&services, MODEL, &sku_loc.view(), &principal)?)
    })())
}

/// Set the on-hand qty. `qty` is locked, so the adjustment names it as
/// unlocked; stock arriving this way is offered to waiting orders.
pub async fn adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let sku_loc = load(&services, tenant_id, &id)?;
        let req: AdjustSkuLocRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let sku_loc_id = sku_loc.id_typed();
        let delta = req.qty.checked_sub(sku_loc.qty()).ok_or_else(|| {
            errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "qty adjustment overflows")
        })?;
        if delta != 0 {
            let cmd = SkuLocCommand::AdjustQty(AdjustQty {
                tenant_id,
                sku_loc_id,
                delta,
                unlocked: vec!["qty".to_string()],
                occurred_at: Utc::now(),
            });
            services
                .dispatch(tenant_id, sku_loc_id.aggregate_id(), aggregate_types::SKU_LOC, cmd, |_, id| {
                    SkuLoc::empty(SkuLocId::new(id))
                })
                .map_err(errors::allocation_error_to_response)?;
            tracing::info!(%tenant_id, %sku_loc_id, delta, "sku_loc qty adjusted");
        }
        respond(&services, tenant_id, sku_loc_id, &principal)
    })())
}

pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let sku_loc = load(&services, tenant_id, &id)?;
        let req: ReceiveRequest = dto::action(body)?;

        let sku_loc_id = sku_loc.id_typed();
        let cmd = SkuLocCommand::Receive(ReceiveQty {
            tenant_id,
            sku_loc_id,
            qty: req.qty,
            unit_cost: req.unit_cost,
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, sku_loc_id.aggregate_id(), aggregate_types::SKU_LOC, cmd, |_, id| {
                SkuLoc::empty(SkuLocId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;
        respond(&services, tenant_id, sku_loc_id, &principal)
    })())
}

/// Walk the waiting order lines for this sku-loc and allocate what the
/// available qty covers.
pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, "sales_order")?;
        let sku_loc_id: SkuLocId = dto::parse_id(&id, MODEL)?;
        let plan = services
            .allocate(tenant_id, sku_loc_id)
            .map_err(errors::allocation_error_to_response)?;

        let allocations: Vec<JsonValue> = plan
            .allocations
            .iter()
            .map(|a| {
                let (order_id, line_no) = a.line;
                json!({ "sales_order_id": order_id, "line_no": line_no, "qty": a.qty })
            })
            .collect();
        ok(json!({
            "sku_loc_id": sku_loc_id,
            "qty_allocated": plan.qty_allocated,
            "qty_available": plan.qty_available,
            "allocations": allocations,
        }))
    })())
}
