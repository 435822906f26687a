//! Request bodies, read from JSON after it has been sanitized for the
//! caller, plus the helpers that run that pipeline.

use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use stockor_accounting::GlPosting;
use stockor_auth::ModelAccess;
use stockor_inventory::{LocationId, SkuId, SkuLocId};
use stockor_parties::{Address, BusinessEntityId, Terms};
use stockor_sales::{PickTicketId, SalesOrderId};

use crate::app::errors;
use crate::app::services::AppServices;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentTermRequest {
    pub code: String,
    #[serde(default)]
    pub days: u32,
    pub description: String,
    pub discount_days: Option<u32>,
    pub discount_amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    pub code: String,
    pub name: String,
    pub gl_branch_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSkuRequest {
    pub code: String,
    pub description: String,
    pub default_uom_size: Option<i64>,
    pub can_backorder: Option<bool>,
    pub gl_asset_account: Option<String>,
    pub does_track_inventory: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub code: Option<String>,
    pub name: String,
    pub billing_address_attributes: Option<Address>,
    pub shipping_address_attributes: Option<Address>,
    pub terms_attributes: Option<Terms>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSkuLocRequest {
    pub sku_id: SkuId,
    pub location_id: LocationId,
    pub bin: Option<String>,
}

/// New on-hand qty; the difference from the current qty is applied.
#[derive(Debug, Deserialize)]
pub struct AdjustSkuLocRequest {
    pub qty: i64,
}

/// Receiving is an action rather than an attribute write.
#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub qty: i64,
    pub unit_cost: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SalesOrderLineRequest {
    pub sku_loc_id: SkuLocId,
    pub qty: i64,
    pub price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uom_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSalesOrderRequest {
    pub customer_id: Option<BusinessEntityId>,
    pub customer_code: Option<String>,
    pub location_id: Option<LocationId>,
    pub location_code: Option<String>,
    pub terms_code: Option<String>,
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines_attributes: Vec<SalesOrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeLocationRequest {
    pub location_id: Option<LocationId>,
    pub location_code: Option<String>,
}

/// Complete the ticket, or cancel it to return picking to allocated.
#[derive(Debug, Default, Deserialize)]
pub struct ClosePickTicketRequest {
    #[serde(default)]
    pub cancel: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub sales_order_id: SalesOrderId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub invoice_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GlTransactionRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub credits_attributes: Vec<GlPosting>,
    #[serde(default)]
    pub debits_attributes: Vec<GlPosting>,
}

#[derive(Debug, Deserialize)]
pub struct GlManualEntryRequest {
    pub notes: Option<String>,
    #[serde(default)]
    pub gl_transaction_attributes: GlTransactionRequest,
}

/// Sanitize `body` for `model` and read the surviving attributes as `T`.
pub fn sanitized<T: DeserializeOwned>(
    services: &AppServices,
    model: &str,
    body: &JsonValue,
    user: &dyn ModelAccess,
) -> Result<T, Response> {
    let clean = services
        .sanitize(model, body, user)
        .map_err(errors::export_error_to_response)?;
    serde_json::from_value(JsonValue::Object(clean))
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

/// Plain action body, not subject to attribute filtering.
pub fn action<T: DeserializeOwned>(body: JsonValue) -> Result<T, Response> {
    serde_json::from_value(body)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))
}

pub fn exported<T: serde::Serialize>(
    services: &AppServices,
    model: &str,
    record: &T,
    user: &dyn ModelAccess,
) -> Result<JsonValue, Response> {
    services
        .export(model, record, user)
        .map_err(errors::export_error_to_response)
}

pub fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse().map_err(|_| errors::invalid_id(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::build_services;
    use stockor_auth::{Permission, Principal, PrincipalId, Role, TenantMembership, permissions_for_roles};
    use stockor_core::TenantId;

    fn principal(roles: Vec<Role>) -> Principal {
        let permissions: Vec<Permission> = permissions_for_roles(&roles);
        Principal::new(
            PrincipalId::new(),
            TenantMembership {
                tenant_id: TenantId::new(),
                roles,
                permissions,
            },
        )
    }

    #[test]
    fn unknown_attributes_are_dropped_before_deserializing() {
        let services = build_services();
        let body = serde_json::json!({
            "code": "NET30",
            "days": 30,
            "description": "Net 30",
            "created_by_id": 7,
            "rogue": true,
        });
        let req: CreatePaymentTermRequest =
            sanitized(&services, "payment_term", &body, &principal(vec![Role::ADMIN])).unwrap();
        assert_eq!(req.code, "NET30");
        assert_eq!(req.days, 30);
    }

    #[test]
    fn nested_lines_survive_for_writers() {
        let services = build_services();
        let sku_loc_id = SkuLocId::generate();
        let body = serde_json::json!({
            "location_code": "DEFAULT",
            "lines": [{"sku_loc_id": sku_loc_id, "qty": 2, "price": "1.50", "qty_allocated": 2}],
        });
        let req: CreateSalesOrderRequest =
            sanitized(&services, "sales_order", &body, &principal(vec![Role::CLERK])).unwrap();
        assert_eq!(req.lines_attributes.len(), 1);
        assert_eq!(req.lines_attributes[0].sku_loc_id, sku_loc_id);
    }

    #[test]
    fn non_writers_get_nothing_through() {
        let services = build_services();
        let body = serde_json::json!({"code": "NET30", "description": "Net 30"});
        let res = sanitized::<CreatePaymentTermRequest>(&services, "payment_term", &body, &principal(vec![Role::VIEWER]));
        assert_eq!(res.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
