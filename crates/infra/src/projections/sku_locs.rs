use stockor_core::TenantId;
use stockor_inventory::{LocationId, SkuId, SkuLoc, SkuLocId};
use stockor_sales::StockedSku;

use crate::projections::AggregateProjection;
use crate::read_model::TenantStore;

/// Queries over the sku-loc read model.
impl<S> AggregateProjection<SkuLoc, S>
where
    S: TenantStore<SkuLocId, SkuLoc>,
{
    /// The record for a sku in a location, if one exists.
    pub fn find_for(&self, tenant_id: TenantId, sku_id: SkuId, location_id: LocationId) -> Option<SkuLoc> {
        self.find(tenant_id, |sl| {
            sl.is_created() && sl.sku().id == Some(sku_id) && sl.location().id == Some(location_id)
        })
    }

    pub fn in_location(&self, tenant_id: TenantId, location_id: LocationId) -> Vec<SkuLoc> {
        self.list(tenant_id)
            .into_iter()
            .filter(|sl| sl.location().id == Some(location_id))
            .collect()
    }

    /// Skus a location carries, in the shape an order's location change wants.
    pub fn stocked_in(&self, tenant_id: TenantId, location_id: LocationId) -> Vec<StockedSku> {
        self.in_location(tenant_id, location_id)
            .iter()
            .map(|sl| StockedSku {
                sku_code: sl.sku_code().to_string(),
                sku_loc_id: sl.id_typed(),
            })
            .collect()
    }
}
