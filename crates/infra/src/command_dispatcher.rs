//! Command execution pipeline.
//!
//! ```text
//! load stream -> rehydrate -> handle -> append -> publish
//! ```
//!
//! Events are published only after the append succeeded. A publish failure
//! is reported but the events stay committed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockor_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use stockor_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version or a duplicate record.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// A stored payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Conflict(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Runs commands against event-sourced aggregates.
///
/// `make_aggregate` builds the blank aggregate that history is replayed
/// onto, e.g. `|_, id| SkuLoc::empty(SkuLocId::new(id))`.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockor_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        tracing::debug!(
            %tenant_id,
            %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            "command committed"
        );

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Current state of one aggregate, rebuilt from its stream.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockor_events::InMemoryEventBus;
    use stockor_inventory::{
        AdjustQty, CreateSkuLoc, LocationId, LocationRef, ReceiveQty, SkuId, SkuLoc, SkuLocCommand, SkuLocId,
        SkuRef,
    };

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn make(_: TenantId, id: AggregateId) -> SkuLoc {
        SkuLoc::empty(SkuLocId::new(id))
    }

    fn create(tenant_id: TenantId, id: SkuLocId) -> SkuLocCommand {
        SkuLocCommand::Create(CreateSkuLoc {
            tenant_id,
            sku_loc_id: id,
            sku: SkuRef {
                id: Some(SkuId::generate()),
                code: "HAT".into(),
                description: "Hat".into(),
            },
            location: LocationRef {
                id: Some(LocationId::generate()),
                code: "DEFAULT".into(),
                name: "Default".into(),
            },
            bin: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let id = SkuLocId::generate();

        d.dispatch(tenant, id.aggregate_id(), "inventory.sku_loc", create(tenant, id), make)
            .unwrap();
        let receive = SkuLocCommand::Receive(ReceiveQty {
            tenant_id: tenant,
            sku_loc_id: id,
            qty: 4,
            unit_cost: Decimal::new(250, 2),
            occurred_at: Utc::now(),
        });
        let committed = d
            .dispatch(tenant, id.aggregate_id(), "inventory.sku_loc", receive, make)
            .unwrap();

        assert_eq!(committed[0].sequence_number, 2);
        let published = sub.drain();
        assert_eq!(published.len(), 1 + committed.len());

        let loaded: SkuLoc = d.load(tenant, id.aggregate_id(), make).unwrap();
        assert_eq!(loaded.qty(), 4);
        assert_eq!(loaded.mac(), Decimal::new(250, 2));
    }

    #[test]
    fn domain_errors_are_mapped_and_nothing_is_written() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = SkuLocId::generate();
        d.dispatch(tenant, id.aggregate_id(), "inventory.sku_loc", create(tenant, id), make)
            .unwrap();

        let locked = SkuLocCommand::AdjustQty(AdjustQty {
            tenant_id: tenant,
            sku_loc_id: id,
            delta: 3,
            unlocked: vec![],
            occurred_at: Utc::now(),
        });
        let err = d
            .dispatch(tenant, id.aggregate_id(), "inventory.sku_loc", locked, make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(ref m) if m == "qty is locked"));

        let dup = d
            .dispatch(tenant, id.aggregate_id(), "inventory.sku_loc", create(tenant, id), make)
            .unwrap_err();
        assert!(matches!(dup, DispatchError::Conflict(_)));
        assert_eq!(d.store().load_stream(tenant, id.aggregate_id()).unwrap().len(), 1);
    }
}
