use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockor_export::{Exportable, ModelSchema};
use stockor_inventory::{LineQty, SkuLocId};

stockor_core::model_id!(PickTicketId);

/// A line to pick: allocated order-line units handed to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtLine {
    pub so_line_no: u32,
    pub sku_loc_id: SkuLocId,
    pub sku_code: String,
    pub uom_size: i64,
    pub qty: i64,
    pub qty_invoiced: i64,
}

impl PtLine {
    pub fn qty_to_ship(&self) -> i64 {
        (self.qty - self.qty_invoiced).max(0)
    }

    pub fn is_picking(&self) -> bool {
        self.qty_to_ship() > 0
    }
}

/// Pick ticket for one sales order. Owned by the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTicket {
    pub id: PickTicketId,
    pub lines: Vec<PtLine>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl PickTicket {
    pub fn line_for(&self, so_line_no: u32) -> Option<&PtLine> {
        self.lines.iter().find(|l| l.so_line_no == so_line_no)
    }

    /// Eaches still picking on this ticket, per sku-loc.
    pub fn picking_qtys(&self) -> Vec<LineQty> {
        if self.is_complete {
            return Vec::new();
        }
        self.lines
            .iter()
            .filter(|l| l.is_picking())
            .map(|l| LineQty {
                sku_loc_id: l.sku_loc_id,
                ea_qty: l.qty_to_ship() * l.uom_size,
            })
            .collect()
    }
}

impl Exportable for PickTicket {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("pick_ticket")
            .with_columns(["id", "sales_order_id", "is_complete", "created_at"])
            .has_many("lines", "pt_line")
    }
}

impl Exportable for PtLine {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("pt_line")
            .with_columns(["so_line_no", "sku_loc_id", "sku_code", "uom_size", "qty", "qty_invoiced"])
            .export_methods(["qty_to_ship"])
    }
}
