use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_export::{Exportable, ModelSchema};
use stockor_inventory::{SkuLocId, SkuLocLine, max_allocatable};

use crate::order::SalesOrderId;

/// A line on a sales order. Quantities are in units of `uom_size` eaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoLine {
    pub line_no: u32,
    pub sku_loc_id: SkuLocId,
    pub sku_code: String,
    pub description: String,
    pub uom_size: i64,
    pub qty: i64,
    pub price: Decimal,
    pub qty_allocated: i64,
    pub qty_picking: i64,
    pub qty_invoiced: i64,
    pub qty_canceled: i64,
    pub created_at: DateTime<Utc>,
}

impl SoLine {
    /// Units still waiting for stock.
    pub fn qty_unallocated(&self) -> i64 {
        (self.qty - self.qty_allocated - self.qty_picking - self.qty_invoiced - self.qty_canceled).max(0)
    }

    pub fn ea_qty_allocated(&self) -> i64 {
        self.qty_allocated * self.uom_size
    }

    pub fn ea_qty_picking(&self) -> i64 {
        self.qty_picking * self.uom_size
    }

    pub fn is_allocated(&self) -> bool {
        self.qty_allocated > 0
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.is_allocated() && self.qty_unallocated() == 0
    }

    pub fn is_pickable(&self) -> bool {
        self.qty_allocated > 0
    }

    /// Invoiced or canceled in full.
    pub fn is_closed(&self) -> bool {
        self.qty_invoiced + self.qty_canceled >= self.qty
    }

    /// Saturates at `Decimal::MAX`; order lines are validated to fit.
    pub fn extended_price(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.qty))
    }

    /// Allocate as many units as `available_ea` eaches cover. Returns the
    /// units added.
    pub fn allocate_max_available(&mut self, available_ea: i64) -> i64 {
        let qty = max_allocatable(self.qty_unallocated(), self.uom_size, available_ea);
        self.qty_allocated += qty;
        qty
    }
}

impl Exportable for SoLine {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("so_line")
            .with_tracked_columns([
                "sales_order_id",
                "line_no",
                "sku_loc_id",
                "sku_code",
                "description",
                "uom_size",
                "qty",
                "price",
                "qty_allocated",
                "qty_picking",
                "qty_invoiced",
                "qty_canceled",
            ])
            .belongs_to("sku_loc", "sku_loc")
            .export_methods(["ea_qty_allocated", "is_fully_allocated", "extended_price"])
    }
}

/// An order line paired with its order, as the allocator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedLine {
    pub order_id: SalesOrderId,
    pub line: SoLine,
}

impl SkuLocLine for OrderedLine {
    type Key = (SalesOrderId, u32);

    fn key(&self) -> Self::Key {
        (self.order_id, self.line.line_no)
    }

    fn sku_loc_id(&self) -> SkuLocId {
        self.line.sku_loc_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.line.created_at
    }

    fn uom_size(&self) -> i64 {
        self.line.uom_size
    }

    fn qty_allocated(&self) -> i64 {
        self.line.qty_allocated
    }

    fn qty_unallocated(&self) -> i64 {
        self.line.qty_unallocated()
    }
}
