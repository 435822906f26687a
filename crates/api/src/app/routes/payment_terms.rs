use std::sync::Arc;

use axum::{Extension, Json, response::Response};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_accounting::{CreatePaymentTerm, PaymentTerm, PaymentTermCommand, PaymentTermId};
use stockor_core::code;
use stockor_infra::aggregate_types;

use super::common::{HandlerResult, created, duplicate_code, exported_list, finish, ok};
use crate::app::dto::{self, CreatePaymentTermRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "payment_term";

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut terms = services.read_models.payment_terms.list(tenant.tenant_id());
        terms.sort_by(|a, b| a.code().cmp(b.code()));
        ok(exported_list(&services, MODEL, &terms, &principal)?)
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
        let req: CreatePaymentTermRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let wanted = code::normalize(&req.code);
        if services
            .read_models
            .payment_terms
            .find(tenant_id, |t| t.code() == wanted)
            .is_some()
        {
            return Err(duplicate_code(MODEL, &wanted));
        }

        let term_id = PaymentTermId::generate();
        let cmd = PaymentTermCommand::Create(CreatePaymentTerm {
            tenant_id,
            term_id,
            code: req.code,
            days: req.days,
            description: req.description,
            discount_days: req.discount_days,
            discount_amount: req.discount_amount,
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, term_id.aggregate_id(), aggregate_types::PAYMENT_TERM, cmd, |_, id| {
                PaymentTerm::empty(PaymentTermId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;

        let term = services
            .read_models
            .payment_terms
            .get(tenant_id, &term_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &term, &principal)?)
    })())
}
