//! Entity trait: identity that survives state changes.

/// Any model addressed by id (sku, location, sku-loc, order, ...).
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Model name used by the export layer and permissions (e.g. `"sku_loc"`).
    fn model_name() -> &'static str
    where
        Self: Sized;
}
