use std::sync::Arc;

use axum::{Extension, Json, response::Response};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_core::code;
use stockor_infra::aggregate_types;
use stockor_inventory::{CreateSku, Sku, SkuCommand, SkuId};

use super::common::{HandlerResult, created, duplicate_code, exported_list, finish, ok};
use crate::app::dto::{self, CreateSkuRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "sku";

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut skus = services.read_models.skus.list(tenant.tenant_id());
        skus.sort_by(|a, b| a.code().cmp(b.code()));
        ok(exported_list(&services, MODEL, &skus, &principal)?)
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
        let req: CreateSkuRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let wanted = code::normalize(&req.code);
        if services.read_models.skus.find(tenant_id, |s| s.code() == wanted).is_some() {
            return Err(duplicate_code(MODEL, &wanted));
        }

        let sku_id = SkuId::generate();
        let cmd = SkuCommand::Create(CreateSku {
            tenant_id,
            sku_id,
            code: req.code,
            description: req.description,
            default_uom_size: req.default_uom_size,
            can_backorder: req.can_backorder,
            gl_asset_account: req.gl_asset_account,
            does_track_inventory: req.does_track_inventory,
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, sku_id.aggregate_id(), aggregate_types::SKU, cmd, |_, id| {
                Sku::empty(SkuId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;

        let sku = services
            .read_models
            .skus
            .get(tenant_id, &sku_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &sku, &principal)?)
    })())
}
