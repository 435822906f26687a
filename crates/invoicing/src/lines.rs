use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_export::{Exportable, ModelSchema};
use stockor_inventory::SkuLocId;
use stockor_sales::{InvoicedQty, PickTicket, SalesOrder, SoLine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub so_line_no: u32,
    pub sku_loc_id: SkuLocId,
    pub sku_code: String,
    pub description: String,
    pub qty: i64,
    pub price: Decimal,
}

impl InvoiceLine {
    fn for_so_line(line: &SoLine, qty: i64) -> Self {
        Self {
            so_line_no: line.line_no,
            sku_loc_id: line.sku_loc_id,
            sku_code: line.sku_code.clone(),
            description: line.description.clone(),
            qty,
            price: line.price,
        }
    }

    pub fn extended_price(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.qty))
    }
}

impl Exportable for InvoiceLine {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("invoice_line")
            .with_tracked_columns(["invoice_id", "so_line_no", "sku_loc_id", "sku_code", "description", "qty", "price"])
            .export_methods(["extended_price"])
    }
}

/// Builders for an invoice's lines.
pub struct InvoiceLines;

impl InvoiceLines {
    /// One line per pick-ticket line, billing what is left to ship.
    pub fn from_pick_ticket(order: &SalesOrder, ticket: &PickTicket) -> Vec<InvoiceLine> {
        ticket
            .lines
            .iter()
            .filter_map(|pt_line| {
                order
                    .line(pt_line.so_line_no)
                    .map(|so_line| InvoiceLine::for_so_line(so_line, pt_line.qty_to_ship()))
            })
            .collect()
    }

    /// One line per order line, billing what is allocated.
    pub fn from_sales_order(order: &SalesOrder) -> Vec<InvoiceLine> {
        order
            .lines()
            .iter()
            .map(|line| InvoiceLine::for_so_line(line, line.qty_allocated))
            .collect()
    }

    /// Quantities to record on the order once posted.
    pub fn invoiced_qtys(lines: &[InvoiceLine]) -> Vec<InvoicedQty> {
        lines
            .iter()
            .filter(|l| l.qty > 0)
            .map(|l| InvoicedQty {
                line_no: l.so_line_no,
                qty: l.qty,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use stockor_core::TenantId;
    use stockor_events::execute;
    use stockor_inventory::{LocationId, LocationRef};
    use stockor_parties::BusinessEntityId;
    use stockor_sales::{
        AllocateLine, AllocateLines, CreatePickTicket, CreateSalesOrder, CustomerRef, NewLine,
        PickTicketId, SalesOrderCommand, SalesOrderId,
    };

    /// Two-line order: line 1 allocated 3 of 5, line 2 unallocated.
    pub(crate) fn order_with_allocation(tenant_id: TenantId) -> SalesOrder {
        let order_id = SalesOrderId::generate();
        let mut order = SalesOrder::empty(order_id);
        let line = |code: &str, qty| NewLine {
            sku_loc_id: SkuLocId::generate(),
            sku_code: code.into(),
            description: String::new(),
            uom_size: None,
            qty,
            price: Decimal::new(1000, 2),
        };
        let create = SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id,
            order_id,
            customer: CustomerRef {
                id: Some(BusinessEntityId::generate()),
                code: "STITT".into(),
            },
            location: LocationRef {
                id: Some(LocationId::generate()),
                code: "DEFAULT".into(),
                name: "Default".into(),
            },
            terms_code: None,
            order_date: None,
            lines: vec![line("STRING", 5), line("HAT", 2)],
            occurred_at: Utc::now(),
        });
        execute(&mut order, &create).unwrap();
        let allocate = SalesOrderCommand::AllocateLines(AllocateLines {
            tenant_id,
            order_id,
            lines: vec![AllocateLine { line_no: 1, available_ea: 3 }],
            occurred_at: Utc::now(),
        });
        execute(&mut order, &allocate).unwrap();
        order
    }

    #[test]
    fn from_sales_order_bills_allocated_qty() {
        let order = order_with_allocation(TenantId::new());
        let lines = InvoiceLines::from_sales_order(&order);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].qty, 3);
        assert_eq!(lines[1].qty, 0);
        assert_eq!(
            InvoiceLines::invoiced_qtys(&lines),
            vec![InvoicedQty { line_no: 1, qty: 3 }]
        );
    }

    #[test]
    fn from_pick_ticket_bills_qty_to_ship() {
        let tenant_id = TenantId::new();
        let mut order = order_with_allocation(tenant_id);
        let ticket_id = PickTicketId::generate();
        let cmd = SalesOrderCommand::CreatePickTicket(CreatePickTicket {
            tenant_id,
            order_id: order.id_typed(),
            ticket_id,
            occurred_at: Utc::now(),
        });
        execute(&mut order, &cmd).unwrap();

        let ticket = order.pick_ticket(ticket_id).unwrap();
        let lines = InvoiceLines::from_pick_ticket(&order, ticket);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].sku_code, "STRING");
        assert_eq!(lines[0].qty, 3);
        assert_eq!(lines[0].extended_price(), Decimal::new(3000, 2));
    }
}
