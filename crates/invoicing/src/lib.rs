//! Invoices billed against sales orders and pick tickets.

pub mod invoice;
pub mod lines;

pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceId, InvoicePosted,
    InvoiceState, PostInvoice,
};
pub use lines::{InvoiceLine, InvoiceLines};

pub fn register_models(registry: &mut stockor_export::ModelRegistry) {
    registry
        .register_model::<Invoice>()
        .register_model::<InvoiceLine>();
}
