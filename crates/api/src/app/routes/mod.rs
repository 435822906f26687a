use axum::{
    Router,
    routing::{get, post},
};

pub mod common;
pub mod customers;
pub mod gl;
pub mod invoices;
pub mod locations;
pub mod payment_terms;
pub mod sales_orders;
pub mod sku_locs;
pub mod skus;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/payment_terms", get(payment_terms::list).post(payment_terms::create))
        .route("/customers", get(customers::list).post(customers::create))
        .route("/locations", get(locations::list).post(locations::create))
        .route("/skus", get(skus::list).post(skus::create))
        .nest("/sku_locs", sku_locs::router())
        .nest("/sales_orders", sales_orders::router())
        .nest("/invoices", invoices::router())
        .route("/gl_manual_entries", post(gl::create))
        .route("/gl_manual_entries/sanitize", post(gl::sanitize_manual_entry))
}
