use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_core::TenantId;
use stockor_infra::aggregate_types;
use stockor_invoicing::{CreateInvoice, Invoice, InvoiceCommand, InvoiceId, InvoiceLines};

use super::common::{HandlerResult, created, exported_list, finish, ok};
use crate::app::dto::{self, CreateInvoiceRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "invoice";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show))
        .route("/:id/post", post(post_invoice))
}

fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<Invoice, Response> {
    let id: InvoiceId = dto::parse_id(raw_id, MODEL)?;
    services
        .read_models
        .invoices
        .get(tenant_id, &id)
        .ok_or_else(|| errors::not_found(MODEL))
}

fn run(services: &AppServices, tenant_id: TenantId, invoice_id: InvoiceId, cmd: InvoiceCommand) -> Result<(), Response> {
    services
        .dispatch(tenant_id, invoice_id.aggregate_id(), aggregate_types::INVOICE, cmd, |_, id| {
            Invoice::empty(InvoiceId::new(id))
        })
        .map(|_| ())
        .map_err(errors::allocation_error_to_response)
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut invoices = services.read_models.invoices.list(tenant.tenant_id());
        invoices.sort_by_key(|i| (i.invoice_date(), i.id_typed()));
        ok(exported_list(&services, MODEL, &invoices, &principal)?)
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
        let invoice = load(&services, tenant.tenant_id(), &id)?;
        ok(dto::exported(&services, MODEL, &invoice, &principal)?)
    })())
}

/// Bill a pick ticket, or the order's allocated qty when no ticket is named.
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
        let req: CreateInvoiceRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let order = services
            .read_models
            .sales_orders
            .get(tenant_id, &req.sales_order_id)
            .ok_or_else(|| errors::not_found("sales_order"))?;
        let lines = match req.pick_ticket_id {
            Some(ticket_id) => {
                let ticket = order
                    .pick_ticket(ticket_id)
                    .ok_or_else(|| errors::not_found("pick_ticket"))?;
                InvoiceLines::from_pick_ticket(&order, ticket)
            }
            None => InvoiceLines::from_sales_order(&order),
        };

        let invoice_id = InvoiceId::generate();
        let cmd = InvoiceCommand::Create(CreateInvoice {
            tenant_id,
            invoice_id,
            sales_order_id: order.id_typed(),
            pick_ticket_id: req.pick_ticket_id,
            customer_code: order.customer().code.clone(),
            terms_code: order.terms_code().to_string(),
            invoice_date: req.invoice_date,
            lines,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, invoice_id, cmd)?;

        let invoice = services
            .read_models
            .invoices
            .get(tenant_id, &invoice_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &invoice, &principal)?)
    })())
}

/// Posting records the billed qty on the sales order; an order that can no
/// longer bill the invoice's quantities refuses it with 409.
pub async fn post_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let invoice_id = load(&services, tenant_id, &id)?.id_typed();
        services
            .post_invoice(tenant_id, invoice_id)
            .map_err(errors::allocation_error_to_response)?;

        let invoice = load(&services, tenant_id, &id)?;
        ok(dto::exported(&services, MODEL, &invoice, &principal)?)
    })())
}
