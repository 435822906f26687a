use chrono::{DateTime, Utc};

/// A fact recorded by a Stockor aggregate.
///
/// Events are immutable, versioned, and only ever appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name, e.g. `"inventory.sku_loc.qty_changed"`.
    fn event_type(&self) -> &'static str;

    /// Schema version of this event type.
    fn version(&self) -> u32;

    /// Business time.
    fn occurred_at(&self) -> DateTime<Utc>;
}
