//! Infrastructure layer: event store, command dispatch, read models, the
//! allocation process and the relational schema.

pub mod allocation;
pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod schema;
pub mod sku_loc_store;

#[cfg(test)]
mod testing;

/// Stream names stamped on stored events.
pub mod aggregate_types {
    pub const PAYMENT_TERM: &str = "accounting.payment_term";
    pub const LEDGER: &str = "accounting.ledger";
    pub const BUSINESS_ENTITY: &str = "parties.business_entity";
    pub const LOCATION: &str = "inventory.location";
    pub const SKU: &str = "inventory.sku";
    pub const SKU_LOC: &str = "inventory.sku_loc";
    pub const SALES_ORDER: &str = "sales.order";
    pub const INVOICE: &str = "invoicing.invoice";
}

pub use allocation::{AllocationError, AllocationService};
pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use projections::ReadModels;
pub use sku_loc_store::SkuLocStore;
