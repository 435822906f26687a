//! In-process wiring: event store, bus, read models, the allocation process
//! and the export registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use stockor_auth::ModelAccess;
use stockor_core::{Aggregate, AggregateId, DomainError, TenantId};
use stockor_events::{Event, EventEnvelope, InMemoryEventBus};
use stockor_export::{ExportError, ModelRegistry};
use stockor_infra::event_store::{InMemoryEventStore, StoredEvent};
use stockor_infra::{AllocationError, AllocationService, CommandDispatcher, DispatchError, ReadModels, SkuLocStore};
use stockor_inventory::{AllocationPlan, Location, Sku, SkuLoc, SkuLocId};
use stockor_invoicing::InvoiceId;
use stockor_sales::SalesOrderId;

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub struct AppServices {
    pub registry: ModelRegistry,
    pub dispatcher: Arc<CommandDispatcher<Store, Bus>>,
    pub read_models: Arc<ReadModels>,
    pub sku_locs: SkuLocStore<Store, Bus>,
    pub allocation: AllocationService<Store, Bus>,
    /// Held from a command's dispatch until its reactions have settled, so
    /// allocation always plans against current read models.
    writes: Mutex<()>,
}

pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    // Subscribe before anything is dispatched so no event is missed.
    let read_models = Arc::new(ReadModels::subscribe(&bus));
    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

    AppServices {
        registry: build_registry(),
        sku_locs: SkuLocStore::new(dispatcher.clone(), read_models.clone()),
        allocation: AllocationService::new(dispatcher.clone(), read_models.clone()),
        dispatcher,
        read_models,
        writes: Mutex::new(()),
    }
}

pub fn build_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    stockor_accounting::register_models(&mut registry);
    stockor_parties::register_models(&mut registry);
    stockor_inventory::register_models(&mut registry);
    stockor_sales::register_models(&mut registry);
    stockor_invoicing::register_models(&mut registry);
    if let Err(e) = registry.check_associations() {
        tracing::error!(error = %e, "export registry has dangling associations");
    }
    registry
}

impl AppServices {
    /// Dispatch a command, bring the read models up to date and run the
    /// allocation reactions it triggers.
    ///
    /// Once the command is committed the call succeeds; a failed reaction
    /// is logged.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, AllocationError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let _writes = self.lock_writes();
        let committed = self
            .dispatcher
            .dispatch(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        self.settle();
        Ok(committed)
    }

    pub fn create_sku_loc(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        location: &Location,
        bin: Option<String>,
    ) -> Result<SkuLoc, DispatchError> {
        let _writes = self.lock_writes();
        let sku_loc = self.sku_locs.create(tenant_id, sku, location, bin, Utc::now())?;
        self.settle();
        Ok(sku_loc)
    }

    pub fn allocate(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
    ) -> Result<AllocationPlan<(SalesOrderId, u32)>, AllocationError> {
        let _writes = self.lock_writes();
        self.allocation.allocate(tenant_id, sku_loc_id, Utc::now())
    }

    pub fn post_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), AllocationError> {
        let _writes = self.lock_writes();
        self.allocation.post_invoice(tenant_id, invoice_id, Utc::now())?;
        self.settle();
        Ok(())
    }

    fn settle(&self) {
        let envelopes = self.read_models.sync(self.dispatcher.store());
        if let Err(e) = self.allocation.settle(envelopes) {
            tracing::error!(error = %e, "allocation reactions failed");
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sanitize(
        &self,
        model: &str,
        body: &JsonValue,
        user: &dyn ModelAccess,
    ) -> Result<Map<String, JsonValue>, ExportError> {
        self.registry.sanitize_value(model, body, user)
    }

    pub fn export<T: Serialize>(&self, model: &str, record: &T, user: &dyn ModelAccess) -> Result<JsonValue, ExportError> {
        self.registry.export_record(model, record, user)
    }
}
