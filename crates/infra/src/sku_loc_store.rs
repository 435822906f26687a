use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stockor_core::TenantId;
use stockor_events::{EventBus, EventEnvelope};
use stockor_inventory::{CreateSkuLoc, Location, LocationRef, Sku, SkuLoc, SkuLocCommand, SkuLocId, SkuRef};

use crate::aggregate_types;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::ReadModels;

/// Creates sku-locs while keeping one record per sku and location.
///
/// The duplicate check reads the sku-loc read model, so callers sync it
/// after each create and serialize creates that may race.
pub struct SkuLocStore<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    read_models: Arc<ReadModels>,
}

impl<S, B> SkuLocStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, read_models: Arc<ReadModels>) -> Self {
        Self {
            dispatcher,
            read_models,
        }
    }

    pub fn create(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        location: &Location,
        bin: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<SkuLoc, DispatchError> {
        if self
            .read_models
            .sku_locs
            .find_for(tenant_id, sku.id_typed(), location.id_typed())
            .is_some()
        {
            return Err(DispatchError::Conflict("SKU may not be in the same location twice".to_string()));
        }

        let sku_loc_id = SkuLocId::generate();
        let command = SkuLocCommand::Create(CreateSkuLoc {
            tenant_id,
            sku_loc_id,
            sku: SkuRef {
                id: Some(sku.id_typed()),
                code: sku.code().to_string(),
                description: sku.description().to_string(),
            },
            location: LocationRef {
                id: Some(location.id_typed()),
                code: location.code().to_string(),
                name: location.name().to_string(),
            },
            bin,
            occurred_at,
        });
        self.dispatcher.dispatch(
            tenant_id,
            sku_loc_id.aggregate_id(),
            aggregate_types::SKU_LOC,
            command,
            |_, id| SkuLoc::empty(SkuLocId::new(id)),
        )?;

        tracing::info!(
            %tenant_id,
            %sku_loc_id,
            sku_code = sku.code(),
            location_code = location.code(),
            "sku_loc created"
        );
        self.dispatcher
            .load(tenant_id, sku_loc_id.aggregate_id(), |_, id| SkuLoc::empty(SkuLocId::new(id)))
    }

    pub fn find_or_create_for(
        &self,
        tenant_id: TenantId,
        sku: &Sku,
        location: &Location,
        occurred_at: DateTime<Utc>,
    ) -> Result<SkuLoc, DispatchError> {
        match self
            .read_models
            .sku_locs
            .find_for(tenant_id, sku.id_typed(), location.id_typed())
        {
            Some(existing) => Ok(existing),
            None => self.create(tenant_id, sku, location, None, occurred_at),
        }
    }
}
