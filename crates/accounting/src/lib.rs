//! Accounting: payment terms and the general ledger.

pub mod gl;
pub mod ledger;
pub mod payment_term;

pub use gl::{GlAccount, GlManualEntry, GlPosting, GlTransaction};
pub use ledger::{Ledger, LedgerCommand, LedgerEvent, LedgerId, PostTransaction, TransactionPosted};
pub use payment_term::{
    CreatePaymentTerm, PaymentTerm, PaymentTermCommand, PaymentTermCreated, PaymentTermEvent,
    PaymentTermId, PaymentTermUpdated, UpdatePaymentTerm,
};

/// Register every accounting model with the export registry.
pub fn register_models(registry: &mut stockor_export::ModelRegistry) {
    registry
        .register_model::<PaymentTerm>()
        .register_model::<GlAccount>()
        .register_model::<GlPosting>()
        .register_model::<GlTransaction>()
        .register_model::<GlManualEntry>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_associations_resolve() {
        let mut registry = stockor_export::ModelRegistry::new();
        register_models(&mut registry);
        assert!(registry.contains("gl_manual_entry"));
        assert!(registry.check_associations().is_ok());
    }
}
