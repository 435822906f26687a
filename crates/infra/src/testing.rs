//! In-memory wiring shared by the infra tests.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use stockor_core::TenantId;
use stockor_events::{EventEnvelope, InMemoryEventBus};
use stockor_inventory::{
    CreateLocation, CreateSku, Location, LocationCommand, LocationId, LocationRef, ReceiveQty, Sku, SkuCommand,
    SkuId, SkuLoc, SkuLocCommand, SkuLocId,
};
use stockor_invoicing::{Invoice, InvoiceCommand, InvoiceId};
use stockor_parties::BusinessEntityId;
use stockor_sales::{CreateSalesOrder, CustomerRef, NewLine, SalesOrder, SalesOrderCommand, SalesOrderId};

use crate::aggregate_types;
use crate::event_store::InMemoryEventStore;
use crate::{AllocationService, CommandDispatcher, ReadModels, SkuLocStore};

pub type TestStore = Arc<InMemoryEventStore>;
pub type TestBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub struct Harness {
    pub tenant: TenantId,
    pub dispatcher: Arc<CommandDispatcher<TestStore, TestBus>>,
    pub read_models: Arc<ReadModels>,
}

impl Harness {
    pub fn new() -> Self {
        let bus: TestBus = Arc::new(InMemoryEventBus::new());
        let read_models = Arc::new(ReadModels::subscribe(&bus));
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus));
        Self {
            tenant: TenantId::new(),
            dispatcher,
            read_models,
        }
    }

    pub fn sku_loc_store(&self) -> SkuLocStore<TestStore, TestBus> {
        SkuLocStore::new(self.dispatcher.clone(), self.read_models.clone())
    }

    pub fn allocation(&self) -> AllocationService<TestStore, TestBus> {
        AllocationService::new(self.dispatcher.clone(), self.read_models.clone())
    }

    pub fn sku(&self, code: &str) -> Sku {
        let sku_id = SkuId::generate();
        let command = SkuCommand::Create(CreateSku {
            tenant_id: self.tenant,
            sku_id,
            code: code.into(),
            description: format!("{code} description"),
            default_uom_size: None,
            can_backorder: None,
            gl_asset_account: None,
            does_track_inventory: None,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(self.tenant, sku_id.aggregate_id(), aggregate_types::SKU, command, |_, id| {
                Sku::empty(SkuId::new(id))
            })
            .unwrap();
        self.settle();
        self.read_models.skus.get(self.tenant, &sku_id).unwrap()
    }

    pub fn location(&self, code: &str) -> Location {
        let location_id = LocationId::generate();
        let command = LocationCommand::Create(CreateLocation {
            tenant_id: self.tenant,
            location_id,
            code: code.into(),
            name: format!("{code} warehouse"),
            gl_branch_code: None,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(
                self.tenant,
                location_id.aggregate_id(),
                aggregate_types::LOCATION,
                command,
                |_, id| Location::empty(LocationId::new(id)),
            )
            .unwrap();
        self.settle();
        self.read_models.locations.get(self.tenant, &location_id).unwrap()
    }

    /// A fresh sku stocked in a fresh location, optionally with received qty.
    pub fn stock(&self, sku_code: &str, location_code: &str, qty: i64) -> SkuLoc {
        let sku = self.sku(sku_code);
        let location = self.location(location_code);
        let sku_loc = self
            .sku_loc_store()
            .create(self.tenant, &sku, &location, None, Utc::now())
            .unwrap();
        self.settle();
        if qty > 0 {
            self.receive(&sku_loc, qty);
        }
        self.read_models.sku_locs.get(self.tenant, &sku_loc.id_typed()).unwrap()
    }

    /// Receive at a unit cost of 1.00.
    pub fn receive(&self, sku_loc: &SkuLoc, qty: i64) {
        let sku_loc_id = sku_loc.id_typed();
        let command = SkuLocCommand::Receive(ReceiveQty {
            tenant_id: self.tenant,
            sku_loc_id,
            qty,
            unit_cost: Decimal::ONE,
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(
                self.tenant,
                sku_loc_id.aggregate_id(),
                aggregate_types::SKU_LOC,
                command,
                |_, id| SkuLoc::empty(SkuLocId::new(id)),
            )
            .unwrap();
        self.settle();
    }

    /// Order `qty` of each sku-loc, all drawn from the first sku-loc's location.
    pub fn order(&self, lines: &[(&SkuLoc, i64)]) -> SalesOrderId {
        let order_id = SalesOrderId::generate();
        let location = lines
            .first()
            .map(|(sl, _)| sl.location().clone())
            .unwrap_or_else(|| LocationRef {
                id: Some(LocationId::generate()),
                code: "DEFAULT".into(),
                name: "Default".into(),
            });
        let command = SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id: self.tenant,
            order_id,
            customer: CustomerRef {
                id: Some(BusinessEntityId::generate()),
                code: "STITT".into(),
            },
            location,
            terms_code: None,
            order_date: None,
            lines: lines
                .iter()
                .map(|(sl, qty)| NewLine {
                    sku_loc_id: sl.id_typed(),
                    sku_code: sl.sku_code().to_string(),
                    description: sl.sku_description().to_string(),
                    uom_size: None,
                    qty: *qty,
                    price: Decimal::new(250, 2),
                })
                .collect(),
            occurred_at: Utc::now(),
        });
        self.run_order(order_id, command);
        order_id
    }

    pub fn run_order(&self, order_id: SalesOrderId, command: SalesOrderCommand) {
        self.dispatcher
            .dispatch(
                self.tenant,
                order_id.aggregate_id(),
                aggregate_types::SALES_ORDER,
                command,
                |_, id| SalesOrder::empty(SalesOrderId::new(id)),
            )
            .unwrap();
        self.settle();
    }

    pub fn run_invoice(&self, invoice_id: InvoiceId, command: InvoiceCommand) {
        self.dispatcher
            .dispatch(
                self.tenant,
                invoice_id.aggregate_id(),
                aggregate_types::INVOICE,
                command,
                |_, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        self.settle();
    }

    /// Sync the read models and run the allocation reactions to completion.
    pub fn settle(&self) {
        let envelopes = self.read_models.sync(self.dispatcher.store());
        self.allocation().settle(envelopes).unwrap();
    }
}
