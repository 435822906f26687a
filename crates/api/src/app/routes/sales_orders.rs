use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    response::Response,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value as JsonValue;

use stockor_auth::Principal;
use stockor_core::{TenantId, code};
use stockor_infra::aggregate_types;
use stockor_inventory::{Location, LocationRef};
use stockor_parties::{BusinessEntityId, EntityKind};
use stockor_sales::{
    AddLine, CancelSalesOrder, ChangeLocation, ClosePickTicket, CreatePickTicket, CreateSalesOrder,
    CustomerRef, NewLine, PickTicketId, SalesOrder, SalesOrderCommand, SalesOrderId,
};

use super::common::{HandlerResult, created, exported_list, finish, ok, resolve_location};
use crate::app::dto::{
    self, ChangeLocationRequest, ClosePickTicketRequest, CreateSalesOrderRequest, SalesOrderLineRequest,
};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const MODEL: &str = "sales_order";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show))
        .route("/:id/lines", post(add_line))
        .route("/:id/location", post(change_location))
        .route("/:id/cancel", post(cancel))
        .route("/:id/pick_tickets", post(create_pick_ticket))
        .route("/:id/pick_tickets/:ticket_id/close", post(close_pick_ticket))
}

fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<SalesOrder, Response> {
    let id: SalesOrderId = dto::parse_id(raw_id, MODEL)?;
    services
        .read_models
        .sales_orders
        .get(tenant_id, &id)
        .ok_or_else(|| errors::not_found(MODEL))
}

fn respond(services: &AppServices, tenant_id: TenantId, id: SalesOrderId, user: &Principal) -> HandlerResult {
    let order = services
        .read_models
        .sales_orders
        .get(tenant_id, &id)
        .ok_or_else(|| errors::not_found(MODEL))?;
    ok(dto::exported(services, MODEL, &order.view(), user)?)
}

fn run(services: &AppServices, tenant_id: TenantId, order_id: SalesOrderId, cmd: SalesOrderCommand) -> Result<(), Response> {
    services
        .dispatch(tenant_id, order_id.aggregate_id(), aggregate_types::SALES_ORDER, cmd, |_, id| {
            SalesOrder::empty(SalesOrderId::new(id))
        })
        .map(|_| ())
        .map_err(errors::allocation_error_to_response)
}

fn location_ref(location: &Location) -> LocationRef {
    LocationRef {
        id: Some(location.id_typed()),
        code: location.code().to_string(),
        name: location.name().to_string(),
    }
}

fn resolve_customer(
    services: &AppServices,
    tenant_id: TenantId,
    id: Option<BusinessEntityId>,
    code: Option<&str>,
) -> Result<CustomerRef, Response> {
    let entities = &services.read_models.business_entities;
    let found = match (id, code) {
        (Some(id), _) => entities.get(tenant_id, &id),
        (None, Some(wanted)) => {
            let wanted = code::normalize(wanted);
            entities.find(tenant_id, |e| e.kind() == EntityKind::Customer && e.code() == wanted)
        }
        (None, None) => {
            return Err(errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "validation_error",
                "customer_id or customer_code is required",
            ));
        }
    };
    let customer = found
        .filter(|e| e.kind() == EntityKind::Customer)
        .ok_or_else(|| errors::not_found("customer"))?;
    Ok(CustomerRef {
        id: Some(customer.id_typed()),
        code: customer.code().to_string(),
    })
}

/// Lines must name a sku-loc stocked in the order's location.
fn new_line(
    services: &AppServices,
    tenant_id: TenantId,
    location: &LocationRef,
    req: SalesOrderLineRequest,
) -> Result<NewLine, Response> {
    let sku_loc = services
        .read_models
        .sku_locs
        .get(tenant_id, &req.sku_loc_id)
        .ok_or_else(|| errors::not_found("sku_loc"))?;
    if sku_loc.location().id != location.id {
        return Err(errors::json_error(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("sku {} is not stocked in location {}", sku_loc.sku_code(), location.code),
        ));
    }
    Ok(NewLine {
        sku_loc_id: sku_loc.id_typed(),
        sku_code: sku_loc.sku_code().to_string(),
        description: req
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| sku_loc.sku_description().to_string()),
        uom_size: req.uom_size,
        qty: req.qty,
        price: req.price,
    })
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let principal = principal.principal(&tenant);
    finish((|| -> HandlerResult {
        authz::require_read(&principal, MODEL)?;
        let mut orders = services.read_models.sales_orders.list(tenant.tenant_id());
        orders.sort_by(|a, b| (a.order_date(), a.id_typed()).cmp(&(b.order_date(), b.id_typed())));
        let views: Vec<_> = orders.iter().map(SalesOrder::view).collect();
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
        let order = load(&services, tenant.tenant_id(), &id)?;
        ok(dto::exported(&services, MODEL, &order.view(), &principal)?)
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
        let req: CreateSalesOrderRequest = dto::sanitized(&services, MODEL, &body, &principal)?;

        let customer = resolve_customer(&services, tenant_id, req.customer_id, req.customer_code.as_deref())?;
        let location = resolve_location(&services, tenant_id, req.location_id, req.location_code.as_deref())?;
        let location = location_ref(&location);
        let lines = req
            .lines_attributes
            .into_iter()
            .map(|line| new_line(&services, tenant_id, &location, line))
            .collect::<Result<Vec<_>, _>>()?;

        let order_id = SalesOrderId::generate();
        let line_count = lines.len();
        let cmd = SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id,
            order_id,
            customer,
            location,
            terms_code: req.terms_code,
            order_date: req.order_date,
            lines,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;
        tracing::info!(%tenant_id, %order_id, lines = line_count, "sales order created");

        let order = services
            .read_models
            .sales_orders
            .get(tenant_id, &order_id)
            .ok_or_else(|| errors::not_found(MODEL))?;
        created(dto::exported(&services, MODEL, &order.view(), &principal)?)
    })())
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, "so_line")?;
        let order = load(&services, tenant_id, &id)?;
        let req: SalesOrderLineRequest = dto::sanitized(&services, "so_line", &body, &principal)?;
        let line = new_line(&services, tenant_id, order.location(), req)?;

        let order_id = order.id_typed();
        let cmd = SalesOrderCommand::AddLine(AddLine {
            tenant_id,
            order_id,
            line,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;
        respond(&services, tenant_id, order_id, &principal)
    })())
}

/// Move the order to another location, re-pointing each line at the
/// sku-loc the new location stocks.
pub async fn change_location(
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
        let order = load(&services, tenant_id, &id)?;
        let req: ChangeLocationRequest = dto::sanitized(&services, MODEL, &body, &principal)?;
        if req.location_id.is_none() && req.location_code.is_none() {
            return Err(errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "validation_error",
                "location_id or location_code is required",
            ));
        }
        let location = resolve_location(&services, tenant_id, req.location_id, req.location_code.as_deref())?;

        let order_id = order.id_typed();
        let cmd = SalesOrderCommand::ChangeLocation(ChangeLocation {
            tenant_id,
            order_id,
            stocked: services.read_models.sku_locs.stocked_in(tenant_id, location.id_typed()),
            location: location_ref(&location),
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;
        respond(&services, tenant_id, order_id, &principal)
    })())
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, MODEL)?;
        let order_id = load(&services, tenant_id, &id)?.id_typed();
        let cmd = SalesOrderCommand::Cancel(CancelSalesOrder {
            tenant_id,
            order_id,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;
        tracing::info!(%tenant_id, %order_id, "sales order canceled");
        respond(&services, tenant_id, order_id, &principal)
    })())
}

pub async fn create_pick_ticket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, "pick_ticket")?;
        let order_id = load(&services, tenant_id, &id)?.id_typed();
        let ticket_id = PickTicketId::generate();
        let cmd = SalesOrderCommand::CreatePickTicket(CreatePickTicket {
            tenant_id,
            order_id,
            ticket_id,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;

        let order = load(&services, tenant_id, &id)?;
        let view = order.view();
        let ticket = view
            .pick_tickets
            .iter()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| errors::not_found("pick_ticket"))?;
        created(dto::exported(&services, "pick_ticket", ticket, &principal)?)
    })())
}

pub async fn close_pick_ticket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, ticket_id)): Path<(String, String)>,
    body: Option<Json<JsonValue>>,
) -> Response {
    let principal = principal.principal(&tenant);
    let tenant_id = tenant.tenant_id();
    finish((|| -> HandlerResult {
        authz::require_write(&principal, "pick_ticket")?;
        let order = load(&services, tenant_id, &id)?;
        let ticket_id: PickTicketId = dto::parse_id(&ticket_id, "pick_ticket")?;
        if order.pick_ticket(ticket_id).is_none() {
            return Err(errors::not_found("pick_ticket"));
        }
        let req: ClosePickTicketRequest = match body {
            Some(Json(body)) => dto::action(body)?,
            None => ClosePickTicketRequest::default(),
        };

        let order_id = order.id_typed();
        let cmd = SalesOrderCommand::ClosePickTicket(ClosePickTicket {
            tenant_id,
            order_id,
            ticket_id,
            cancel: req.cancel,
            occurred_at: Utc::now(),
        });
        run(&services, tenant_id, order_id, cmd)?;
        respond(&services, tenant_id, order_id, &principal)
    })())
}
