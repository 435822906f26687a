//! Read models built from published events.
//!
//! Every read model is disposable: `ReadModels::rebuild` replays a tenant's
//! streams from the event store.

pub mod aggregate;
pub mod sales_orders;
pub mod sku_locs;

use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;

use stockor_accounting::{PaymentTerm, PaymentTermId};
use stockor_core::TenantId;
use stockor_events::{EventBus, EventEnvelope, Subscription};
use stockor_inventory::{Location, LocationId, Sku, SkuId, SkuLoc, SkuLocId};
use stockor_invoicing::{Invoice, InvoiceId};
use stockor_parties::{BusinessEntity, BusinessEntityId};
use stockor_sales::{SalesOrder, SalesOrderId};

use crate::aggregate_types;
use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::InMemoryTenantStore;

pub use aggregate::{AggregateProjection, ReadModelError};

pub type InMemoryProjection<A, K> = AggregateProjection<A, Arc<InMemoryTenantStore<K, A>>>;

/// All read models of the application, fed from one bus subscription.
pub struct ReadModels {
    pub payment_terms: InMemoryProjection<PaymentTerm, PaymentTermId>,
    pub business_entities: InMemoryProjection<BusinessEntity, BusinessEntityId>,
    pub locations: InMemoryProjection<Location, LocationId>,
    pub skus: InMemoryProjection<Sku, SkuId>,
    pub sku_locs: InMemoryProjection<SkuLoc, SkuLocId>,
    pub sales_orders: InMemoryProjection<SalesOrder, SalesOrderId>,
    pub invoices: InMemoryProjection<Invoice, InvoiceId>,
    subscription: Mutex<Subscription<EventEnvelope<JsonValue>>>,
}

impl ReadModels {
    pub fn subscribe<B>(bus: &B) -> Self
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        Self {
            payment_terms: AggregateProjection::new(
                aggregate_types::PAYMENT_TERM,
                |id| PaymentTerm::empty(PaymentTermId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            business_entities: AggregateProjection::new(
                aggregate_types::BUSINESS_ENTITY,
                |id| BusinessEntity::empty(BusinessEntityId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            locations: AggregateProjection::new(
                aggregate_types::LOCATION,
                |id| Location::empty(LocationId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            skus: AggregateProjection::new(
                aggregate_types::SKU,
                |id| Sku::empty(SkuId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            sku_locs: AggregateProjection::new(
                aggregate_types::SKU_LOC,
                |id| SkuLoc::empty(SkuLocId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            sales_orders: AggregateProjection::new(
                aggregate_types::SALES_ORDER,
                |id| SalesOrder::empty(SalesOrderId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            invoices: AggregateProjection::new(
                aggregate_types::INVOICE,
                |id| Invoice::empty(InvoiceId::new(id)),
                Arc::new(InMemoryTenantStore::new()),
            ),
            subscription: Mutex::new(bus.subscribe()),
        }
    }

    /// Route one envelope to the read model of its aggregate type.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ReadModelError> {
        match envelope.aggregate_type() {
            aggregate_types::PAYMENT_TERM => self.payment_terms.apply_envelope(envelope),
            aggregate_types::BUSINESS_ENTITY => self.business_entities.apply_envelope(envelope),
            aggregate_types::LOCATION => self.locations.apply_envelope(envelope),
            aggregate_types::SKU => self.skus.apply_envelope(envelope),
            aggregate_types::SKU_LOC => self.sku_locs.apply_envelope(envelope),
            aggregate_types::SALES_ORDER => self.sales_orders.apply_envelope(envelope),
            aggregate_types::INVOICE => self.invoices.apply_envelope(envelope),
            _ => Ok(false),
        }
    }

    /// Apply everything published since the last call and hand the
    /// envelopes back so callers can react to them.
    ///
    /// The subscription stays locked until every drained envelope is
    /// applied, so concurrent callers see the read models advance in
    /// publish order. A stream whose envelopes were published out of order
    /// is replayed from `store`.
    pub fn sync<S: EventStore>(&self, store: &S) -> Vec<EventEnvelope<JsonValue>> {
        let subscription = match self.subscription.lock() {
            Ok(sub) => sub,
            Err(_) => {
                tracing::warn!("read model subscription lock poisoned");
                return vec![];
            }
        };
        let pending = subscription.drain();
        for envelope in &pending {
            match self.apply_envelope(envelope) {
                Ok(_) => {}
                Err(ReadModelError::NonMonotonicSequence { last, found }) => {
                    tracing::debug!(
                        aggregate_type = envelope.aggregate_type(),
                        aggregate_id = %envelope.aggregate_id(),
                        last,
                        found,
                        "published stream out of order, replaying from the store"
                    );
                    if let Err(e) = self.restore(store, envelope) {
                        tracing::warn!(
                            aggregate_type = envelope.aggregate_type(),
                            aggregate_id = %envelope.aggregate_id(),
                            error = %e,
                            "projection replay failed"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        aggregate_type = envelope.aggregate_type(),
                        aggregate_id = %envelope.aggregate_id(),
                        error = %e,
                        "projection apply failed"
                    );
                }
            }
        }
        drop(subscription);
        pending
    }

    fn restore<S: EventStore>(&self, store: &S, envelope: &EventEnvelope<JsonValue>) -> Result<(), RebuildError> {
        let tenant_id = envelope.tenant_id();
        let id = envelope.aggregate_id();
        let stream = store.load_stream(tenant_id, id)?;
        match envelope.aggregate_type() {
            aggregate_types::PAYMENT_TERM => self.payment_terms.restore(tenant_id, id, &stream)?,
            aggregate_types::BUSINESS_ENTITY => self.business_entities.restore(tenant_id, id, &stream)?,
            aggregate_types::LOCATION => self.locations.restore(tenant_id, id, &stream)?,
            aggregate_types::SKU => self.skus.restore(tenant_id, id, &stream)?,
            aggregate_types::SKU_LOC => self.sku_locs.restore(tenant_id, id, &stream)?,
            aggregate_types::SALES_ORDER => self.sales_orders.restore(tenant_id, id, &stream)?,
            aggregate_types::INVOICE => self.invoices.restore(tenant_id, id, &stream)?,
            _ => {}
        }
        Ok(())
    }

    pub fn rebuild<S: EventStore>(&self, store: &S, tenant_id: TenantId) -> Result<(), RebuildError> {
        self.payment_terms
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::PAYMENT_TERM)?)?;
        self.business_entities
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::BUSINESS_ENTITY)?)?;
        self.locations
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::LOCATION)?)?;
        self.skus
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::SKU)?)?;
        self.sku_locs
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::SKU_LOC)?)?;
        self.sales_orders
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::SALES_ORDER)?)?;
        self.invoices
            .rebuild(tenant_id, &store.load_by_type(tenant_id, aggregate_types::INVOICE)?)?;
        tracing::info!(%tenant_id, "read models rebuilt");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error(transparent)]
    ReadModel(#[from] ReadModelError),
}
