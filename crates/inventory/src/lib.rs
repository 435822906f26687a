//! Inventory: skus, locations and per-location quantities.

pub mod allocation;
pub mod location;
pub mod sku;
pub mod sku_loc;

pub use allocation::{AllocationPlan, LineAllocation, LineQty, SkuLocLine, max_allocatable};
pub use location::{CreateLocation, Location, LocationCommand, LocationCreated, LocationEvent, LocationId};
pub use sku::{CreateSku, Sku, SkuCommand, SkuCreated, SkuEvent, SkuId};
pub use sku_loc::{
    AdjustQty, CreateSkuLoc, LocationRef, Rebuild, ReceiveQty, SkuLoc, SkuLocCommand, SkuLocCreated,
    SkuLocEvent, SkuLocId, SkuLocView, SkuRef, UpdateQtyPicking, UpdateQtyReserved, UpdateSoQty,
};

pub fn register_models(registry: &mut stockor_export::ModelRegistry) {
    registry
        .register_model::<Sku>()
        .register_model::<Location>()
        .register_model::<SkuLoc>();
}
