use std::sync::Arc;

use axum::{Extension, Json, response::Response};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_core::code;
use stockor_infra::aggregate_types;
use stockor_parties::{
    BusinessEntity, BusinessEntityCommand, BusinessEntityId, EntityKind, RegisterBusinessEntity,
};

use super::common::{HandlerResult, created, duplicate_code, exported_list, finish, ok};
use crate::app::dto::{self, CreateCustomerRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "customer";

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut customers: Vec<BusinessEntity> = services
            .read_models
            .business_entities
            .list(tenant.tenant_id())
            .into_iter()
            .filter(|e| e.kind() == EntityKind::Customer)
            .collect();
        customers.sort_by(|a, b| a.code().cmp(b.code()));
        ok(exported_list(&services, MODEL, &customers, &principal)?)
    })())
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<JsonValue>,
) -> Response {
    let by = principal.user_id();
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let req: CreateCustomerRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        if let Some(wanted) = req.code.as_deref().map(code::normalize) {
            let taken = services.read_models.business_entities.find(tenant_id, |e| {
                e.kind() == EntityKind::Customer && e.code() == wanted
            });
            if taken.is_some() {
                return Err(duplicate_code(MODEL, &wanted));
            }
        }
        if let Some(terms) = &req.terms_attributes {
            let wanted = code::normalize(&terms.code);
            if services
                .read_models
                .payment_terms
                .find(tenant_id, |t| t.code() == wanted)
                .is_none()
            {
                return Err(errors::not_found("payment_term"));
            }
        }

        let entity_id = BusinessEntityId::generate();
        let cmd = BusinessEntityCommand::Register(RegisterBusinessEntity {
            tenant_id,
            entity_id,
            kind: EntityKind::Customer,
            code: req.code,
            name: req.name,
            billing_address: req.billing_address_attributes,
            shipping_address: req.shipping_address_attributes,
            terms: req.terms_attributes,
            by,
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, entity_id.aggregate_id(), aggregate_types::BUSINESS_ENTITY, cmd, |_, id| {
                BusinessEntity::empty(BusinessEntityId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;

        let customer = services
            .read_models
            .business_entities
            .get(tenant_id, &entity_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &customer, &principal)?)
    })())
}
