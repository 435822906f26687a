use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockor_core::{Aggregate, AggregateId, TenantId};
use stockor_events::EventEnvelope;

use crate::event_store::StoredEvent;
use crate::read_model::TenantStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadModelError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: &'static str, message: String },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Read model holding the current state of every aggregate of one type.
///
/// Records are rebuilt by applying the published events to a blank
/// aggregate, so queries see exactly what the command side sees. The
/// aggregate's own version doubles as the stream cursor: replayed
/// envelopes are ignored and gaps are rejected.
pub struct AggregateProjection<A, S>
where
    A: Aggregate,
{
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    store: S,
}

impl<A, S> AggregateProjection<A, S>
where
    A: Aggregate + Clone,
    A::Event: DeserializeOwned,
    S: TenantStore<A::Id, A>,
{
    pub fn new(aggregate_type: &'static str, make: fn(AggregateId) -> A, store: S) -> Self {
        Self {
            aggregate_type,
            make,
            store,
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn get(&self, tenant_id: TenantId, id: &A::Id) -> Option<A> {
        self.store.get(tenant_id, id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<A> {
        self.store.list(tenant_id)
    }

    pub fn find(&self, tenant_id: TenantId, predicate: impl Fn(&A) -> bool) -> Option<A> {
        self.store.find(tenant_id, &predicate)
    }

    /// Returns whether the envelope changed the read model.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ReadModelError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(false);
        }

        let tenant_id = envelope.tenant_id();
        let blank = (self.make)(envelope.aggregate_id());
        let key = blank.id().clone();
        let mut aggregate = self.store.get(tenant_id, &key).unwrap_or(blank);

        let seq = envelope.sequence_number();
        let last = aggregate.version();
        if seq <= last {
            return Ok(false);
        }
        if seq != last + 1 {
            return Err(ReadModelError::NonMonotonicSequence { last, found: seq });
        }

        let event = self.decode(envelope.payload())?;
        aggregate.apply(&event);
        self.store.upsert(tenant_id, key, aggregate);
        Ok(true)
    }

    /// Replace one record with the state replayed from its full stream.
    ///
    /// Used when a published envelope arrives ahead of its predecessor: the
    /// store already holds every event up to it.
    pub fn restore(&self, tenant_id: TenantId, aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), ReadModelError> {
        let mut aggregate = (self.make)(aggregate_id);
        for stored in stream
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.aggregate_id == aggregate_id)
        {
            aggregate.apply(&self.decode(&stored.payload)?);
        }
        if aggregate.version() == 0 {
            return Ok(());
        }

        let key = aggregate.id().clone();
        let current = self.store.get(tenant_id, &key).map(|a| a.version()).unwrap_or(0);
        if aggregate.version() > current {
            self.store.upsert(tenant_id, key, aggregate);
        }
        Ok(())
    }

    fn decode(&self, payload: &JsonValue) -> Result<A::Event, ReadModelError> {
        serde_json::from_value(payload.clone()).map_err(|e| ReadModelError::Deserialize {
            aggregate_type: self.aggregate_type,
            message: e.to_string(),
        })
    }

    /// Drop the tenant's records and replay `events` (one tenant, stream order).
    pub fn rebuild(&self, tenant_id: TenantId, events: &[StoredEvent]) -> Result<(), ReadModelError> {
        self.store.clear_tenant(tenant_id);
        for stored in events.iter().filter(|e| e.tenant_id == tenant_id) {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use stockor_accounting::{CreatePaymentTerm, PaymentTerm, PaymentTermCommand, PaymentTermEvent, PaymentTermId};
    use stockor_core::AggregateRoot;
    use stockor_events::execute;

    use crate::read_model::InMemoryTenantStore;

    type Terms = AggregateProjection<PaymentTerm, Arc<InMemoryTenantStore<PaymentTermId, PaymentTerm>>>;

    fn projection() -> Terms {
        AggregateProjection::new(
            "accounting.payment_term",
            |id| PaymentTerm::empty(PaymentTermId::new(id)),
            Arc::new(InMemoryTenantStore::new()),
        )
    }

    fn created(tenant_id: TenantId, id: PaymentTermId) -> PaymentTermEvent {
        let cmd = PaymentTermCommand::Create(CreatePaymentTerm {
            tenant_id,
            term_id: id,
            code: "NET30".into(),
            days: 30,
            description: "Net 30".into(),
            discount_days: None,
            discount_amount: None,
            occurred_at: Utc::now(),
        });
        let mut term = PaymentTerm::empty(id);
        execute(&mut term, &cmd).unwrap().remove(0)
    }

    fn envelope(tenant_id: TenantId, id: PaymentTermId, seq: u64, payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            id.aggregate_id(),
            "accounting.payment_term",
            seq,
            payload,
        )
    }

    #[test]
    fn applies_in_order_and_ignores_replays() {
        let p = projection();
        let tenant = TenantId::new();
        let id = PaymentTermId::generate();
        let env = envelope(tenant, id, 1, serde_json::to_value(created(tenant, id)).unwrap());

        assert!(p.apply_envelope(&env).unwrap());
        assert!(!p.apply_envelope(&env).unwrap());
        assert_eq!(p.get(tenant, &id).unwrap().code(), "NET30");
        assert!(p.get(TenantId::new(), &id).is_none());
    }

    #[test]
    fn rejects_gaps_and_garbage() {
        let p = projection();
        let tenant = TenantId::new();
        let id = PaymentTermId::generate();

        let gap = envelope(tenant, id, 3, serde_json::to_value(created(tenant, id)).unwrap());
        assert_eq!(
            p.apply_envelope(&gap).unwrap_err(),
            ReadModelError::NonMonotonicSequence { last: 0, found: 3 }
        );

        let garbage = envelope(tenant, id, 1, json!({"nope": true}));
        assert!(matches!(
            p.apply_envelope(&garbage).unwrap_err(),
            ReadModelError::Deserialize { .. }
        ));
    }

    #[test]
    fn restore_replays_the_stream_past_a_gap() {
        let p = projection();
        let tenant = TenantId::new();
        let id = PaymentTermId::generate();
        let stored = StoredEvent {
            event_id: Uuid::now_v7(),
            tenant_id: tenant,
            aggregate_id: id.aggregate_id(),
            aggregate_type: "accounting.payment_term".to_string(),
            sequence_number: 1,
            event_type: "accounting.payment_term.created".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::to_value(created(tenant, id)).unwrap(),
        };

        p.restore(tenant, id.aggregate_id(), &[stored.clone()]).unwrap();
        let term = p.get(tenant, &id).unwrap();
        assert_eq!(term.version(), 1);
        assert_eq!(term.code(), "NET30");

        // Envelopes already covered by the replay are ignored.
        assert!(!p.apply_envelope(&stored.to_envelope()).unwrap());
        p.restore(tenant, id.aggregate_id(), &[]).unwrap();
        assert_eq!(p.get(tenant, &id).unwrap().version(), 1);
    }

    #[test]
    fn other_aggregate_types_are_skipped() {
        let p = projection();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            TenantId::new(),
            AggregateId::new(),
            "inventory.sku",
            1,
            json!({}),
        );
        assert!(!p.apply_envelope(&env).unwrap());
    }
}
