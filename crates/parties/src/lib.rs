//! Business entities: customers and vendors, and their addresses.

pub mod address;
pub mod business_entity;

pub use address::Address;
pub use business_entity::{
    BusinessEntity, BusinessEntityCommand, BusinessEntityEvent, BusinessEntityId,
    BusinessEntityRegistered, BusinessEntityUpdated, EntityKind, GlDefaults, RegisterBusinessEntity,
    Terms, UpdateBusinessEntity,
};

pub fn register_models(registry: &mut stockor_export::ModelRegistry) {
    registry
        .register_model::<Address>()
        .register(business_entity::export_schema(EntityKind::Customer))
        .register(business_entity::export_schema(EntityKind::Vendor));
}
