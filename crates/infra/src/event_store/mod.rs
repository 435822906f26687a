//! Append-only event store boundary.
//!
//! Streams are keyed by `(tenant_id, aggregate_id)`. The in-memory store is
//! the only backend; Postgres is a schema target (see `crate::schema`).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
