//! Manual general-ledger entries.

use std::sync::Arc;

use axum::{Extension, Json, response::Response};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use stockor_accounting::{GlManualEntry, GlTransaction, Ledger, LedgerCommand, LedgerId, PostTransaction};
use stockor_core::{AggregateId, TenantId};
use stockor_infra::aggregate_types;

use super::common::{HandlerResult, created, finish, ok};
use crate::app::dto::{self, GlManualEntryRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "gl_manual_entry";

/// Each tenant posts to a single ledger.
fn ledger_id(tenant_id: TenantId) -> LedgerId {
    LedgerId::new(AggregateId::from_uuid(*tenant_id.as_uuid()))
}

/// Echo what survives sanitizing, so clients can see which attributes the
/// caller is allowed to set.
pub async fn sanitize_manual_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<JsonValue>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        let clean = services
            .sanitize(MODEL, &body, &principal)
            .map_err(errors::export_error_to_response)?;
        ok(JsonValue::Object(clean))
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
        let req: GlManualEntryRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let entry = GlManualEntry {
            notes: req.notes,
            gl_transaction: GlTransaction {
                source: Some("manual".to_string()),
                description: req.gl_transaction_attributes.description,
                credits: req.gl_transaction_attributes.credits_attributes,
                debits: req.gl_transaction_attributes.debits_attributes,
            },
        };

        let ledger_id = ledger_id(tenant_id);
        let entry_id = uuid::Uuid::new_v4();
        let cmd = LedgerCommand::PostTransaction(PostTransaction {
            tenant_id,
            ledger_id,
            entry_id,
            transaction: entry.gl_transaction.clone(),
            occurred_at: Utc::now(),
        });
        services
            .dispatch(tenant_id, ledger_id.aggregate_id(), aggregate_types::LEDGER, cmd, |_, id| {
                Ledger::empty(LedgerId::new(id))
            })
            .map_err(errors::allocation_error_to_response)?;
        tracing::info!(%tenant_id, %entry_id, amount = %entry.gl_transaction.debit_total(), "manual entry posted");

        created(json!({
            "entry_id": entry_id,
            "gl_manual_entry": dto::exported(&services, MODEL, &entry, &principal)?,
        }))
    })())
}
