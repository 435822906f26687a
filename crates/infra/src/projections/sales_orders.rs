use stockor_core::TenantId;
use stockor_inventory::{LineQty, SkuLocId, SkuLocLine};
use stockor_sales::{OrderedLine, SalesOrder, SalesOrderId};

use crate::projections::AggregateProjection;
use crate::read_model::TenantStore;

/// Queries over the sales-order read model.
impl<S> AggregateProjection<SalesOrder, S>
where
    S: TenantStore<SalesOrderId, SalesOrder>,
{
    /// Orders with at least one allocated line.
    pub fn allocated(&self, tenant_id: TenantId) -> Vec<SalesOrder> {
        self.list(tenant_id).into_iter().filter(SalesOrder::is_allocated).collect()
    }

    /// Open-order lines drawing from a sku-loc.
    pub fn lines_for(&self, tenant_id: TenantId, sku_loc_id: SkuLocId) -> Vec<OrderedLine> {
        self.list(tenant_id)
            .iter()
            .flat_map(SalesOrder::allocation_lines)
            .filter(|line| line.sku_loc_id() == sku_loc_id)
            .collect()
    }

    pub fn allocated_qtys_for(&self, tenant_id: TenantId, sku_loc_id: SkuLocId) -> Vec<LineQty> {
        self.allocated(tenant_id)
            .iter()
            .flat_map(SalesOrder::allocated_qtys)
            .filter(|q| q.sku_loc_id == sku_loc_id)
            .collect()
    }

    pub fn picking_qtys_for(&self, tenant_id: TenantId, sku_loc_id: SkuLocId) -> Vec<LineQty> {
        self.list(tenant_id)
            .iter()
            .flat_map(SalesOrder::picking_qtys)
            .filter(|q| q.sku_loc_id == sku_loc_id)
            .collect()
    }
}
