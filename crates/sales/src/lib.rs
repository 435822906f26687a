//! Sales orders, their lines and pick tickets.
//!
//! Pure domain logic; the allocation flow that ties orders to sku-loc stock
//! lives in `stockor-infra`.

pub mod line;
pub mod order;
pub mod pick_ticket;

pub use line::{OrderedLine, SoLine};
pub use order::{
    AddLine, AllocateLine, AllocateLines, CancelSalesOrder, ChangeLocation, ClosePickTicket,
    CreatePickTicket, CreateSalesOrder, CustomerRef, InvoicedQty, NewLine, RecordInvoice, SalesOrder,
    SalesOrderCommand, SalesOrderEvent, SalesOrderId, SalesOrderState, SalesOrderView, StockedSku,
};
pub use pick_ticket::{PickTicket, PickTicketId, PtLine};

pub fn register_models(registry: &mut stockor_export::ModelRegistry) {
    registry
        .register_model::<SalesOrder>()
        .register_model::<SoLine>()
        .register_model::<PickTicket>()
        .register_model::<PtLine>();
}
