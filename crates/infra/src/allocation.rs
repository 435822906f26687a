//! Keeps sales-order allocation and the sku-loc quantity caches in step.
//!
//! The service reacts to committed events:
//!
//! * on-hand qty going up on a sku-loc allocates it to waiting order lines;
//! * order changes refresh the allocated and picking caches of the sku-locs
//!   the order draws from, and releases (cancel, location change) offer the
//!   freed stock to other orders;
//! * a posted invoice records the billed quantities on its sales order.
//!
//! Reactions run to completion on a work queue: every dispatch syncs the
//! read models and queues the resulting envelopes. A failed reaction is
//! logged and the queue keeps draining; the failures are reported once it
//! is empty.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockor_core::{Aggregate, AggregateId, DomainError, TenantId};
use stockor_events::{Event, EventBus, EventEnvelope};
use stockor_inventory::{AllocationPlan, Rebuild, SkuLoc, SkuLocCommand, SkuLocEvent, SkuLocId, SkuLocLine};
use stockor_invoicing::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceLines, InvoicePosted, InvoiceState, PostInvoice,
};
use stockor_sales::{
    AllocateLine, AllocateLines, RecordInvoice, SalesOrder, SalesOrderCommand, SalesOrderEvent, SalesOrderId,
};

use crate::aggregate_types;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::ReadModels;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("sku_loc {0} not found")]
    SkuLocNotFound(SkuLocId),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to read {aggregate_type} event: {message}")]
    Decode {
        aggregate_type: &'static str,
        message: String,
    },

    #[error("{failed} reactions failed, first: {first}")]
    Reactions {
        failed: usize,
        first: Box<AllocationError>,
    },
}

type Queue = VecDeque<EventEnvelope<JsonValue>>;

pub struct AllocationService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    read_models: Arc<ReadModels>,
}

impl<S, B> AllocationService<S, B>
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

    /// Allocate a sku-loc's available qty to its waiting lines, oldest first.
    pub fn allocate(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
        occurred_at: DateTime<Utc>,
    ) -> Result<AllocationPlan<(SalesOrderId, u32)>, AllocationError> {
        let mut queue = Queue::new();
        let plan = self.allocate_into(tenant_id, sku_loc_id, occurred_at, &mut queue)?;
        // The allocation is committed; follow-up failures are only logged.
        if let Err(e) = self.drain(queue) {
            warn!(%tenant_id, %sku_loc_id, error = %e, "allocation follow-up reactions failed");
        }
        Ok(plan)
    }

    /// Recompute the allocated and picking caches from the open orders.
    pub fn refresh(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), AllocationError> {
        let mut queue = Queue::new();
        self.refresh_into(tenant_id, sku_loc_id, occurred_at, &mut queue)?;
        self.drain(queue)
    }

    /// Post an invoice after checking its quantities against what the sales
    /// order can still bill. The order is read from its stream, not from the
    /// read model. Callers settle the published envelopes afterwards.
    pub fn post_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), AllocationError> {
        let invoice: Invoice = self
            .dispatcher
            .load(tenant_id, invoice_id.aggregate_id(), |_, id| Invoice::empty(InvoiceId::new(id)))?;
        if invoice.state() == InvoiceState::Posted {
            return Err(DispatchError::Conflict("invoice is already posted".to_string()).into());
        }
        let order_id = invoice.sales_order_id().ok_or(DispatchError::NotFound)?;
        let order: SalesOrder = self
            .dispatcher
            .load(tenant_id, order_id.aggregate_id(), |_, id| SalesOrder::empty(SalesOrderId::new(id)))?;
        let shippable = order
            .shippable_qtys(invoice.pick_ticket_id())
            .map_err(DispatchError::from)?;

        let command = InvoiceCommand::Post(PostInvoice {
            tenant_id,
            invoice_id,
            shippable,
            occurred_at,
        });
        self.dispatcher.dispatch(
            tenant_id,
            invoice_id.aggregate_id(),
            aggregate_types::INVOICE,
            command,
            |_, id| Invoice::empty(InvoiceId::new(id)),
        )?;
        info!(%tenant_id, %invoice_id, sales_order_id = %order_id, "invoice posted");
        Ok(())
    }

    /// React to envelopes returned by `ReadModels::sync` until nothing is left.
    pub fn settle(&self, envelopes: Vec<EventEnvelope<JsonValue>>) -> Result<(), AllocationError> {
        self.drain(envelopes.into())
    }

    fn drain(&self, mut queue: Queue) -> Result<(), AllocationError> {
        let mut failures = Vec::new();
        while let Some(envelope) = queue.pop_front() {
            if let Err(e) = self.react(&envelope, &mut queue) {
                warn!(
                    tenant_id = %envelope.tenant_id(),
                    aggregate_type = envelope.aggregate_type(),
                    aggregate_id = %envelope.aggregate_id(),
                    error = %e,
                    "reaction failed"
                );
                failures.push(e);
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) if failed == 1 => Err(first),
            Some(first) => Err(AllocationError::Reactions {
                failed,
                first: Box::new(first),
            }),
        }
    }

    fn react(&self, envelope: &EventEnvelope<JsonValue>, queue: &mut Queue) -> Result<(), AllocationError> {
        let tenant_id = envelope.tenant_id();
        match envelope.aggregate_type() {
            aggregate_types::SKU_LOC => match decode::<SkuLocEvent>(envelope, aggregate_types::SKU_LOC)? {
                SkuLocEvent::QtyChanged(change) if change.new > change.old => {
                    self.allocate_into(tenant_id, change.sku_loc_id, change.occurred_at, queue)?;
                }
                SkuLocEvent::BackInStock(e) => {
                    info!(%tenant_id, sku_loc_id = %e.sku_loc_id, sku_code = %e.sku_code, qty = e.qty, "sku back in stock");
                }
                _ => {}
            },
            aggregate_types::SALES_ORDER => {
                let event = decode::<SalesOrderEvent>(envelope, aggregate_types::SALES_ORDER)?;
                let occurred_at = event.occurred_at();
                let order_id = SalesOrderId::new(envelope.aggregate_id());
                let sku_loc_ids = self
                    .read_models
                    .sales_orders
                    .get(tenant_id, &order_id)
                    .map(|order| order.sku_loc_ids())
                    .unwrap_or_default();

                match event {
                    SalesOrderEvent::Created(_) | SalesOrderEvent::LineAdded(_) | SalesOrderEvent::Canceled(_) => {
                        for id in sku_loc_ids {
                            self.allocate_known(tenant_id, id, occurred_at, queue)?;
                        }
                    }
                    SalesOrderEvent::LocationChanged(_) => {
                        // The lines left sku-locs the order no longer references.
                        for sku_loc in self.read_models.sku_locs.list(tenant_id) {
                            self.allocate_known(tenant_id, sku_loc.id_typed(), occurred_at, queue)?;
                        }
                    }
                    SalesOrderEvent::LinesAllocated(_)
                    | SalesOrderEvent::PickTicketCreated(_)
                    | SalesOrderEvent::PickTicketClosed(_)
                    | SalesOrderEvent::InvoiceRecorded(_) => {
                        for id in sku_loc_ids {
                            if self.read_models.sku_locs.get(tenant_id, &id).is_some() {
                                self.refresh_into(tenant_id, id, occurred_at, queue)?;
                            }
                        }
                    }
                }
            }
            aggregate_types::INVOICE => {
                if let InvoiceEvent::Posted(posted) = decode::<InvoiceEvent>(envelope, aggregate_types::INVOICE)? {
                    self.record_invoice_into(&posted, queue)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn allocate_known(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
        occurred_at: DateTime<Utc>,
        queue: &mut Queue,
    ) -> Result<(), AllocationError> {
        match self.allocate_into(tenant_id, sku_loc_id, occurred_at, queue) {
            Err(AllocationError::SkuLocNotFound(id)) => {
                warn!(%tenant_id, sku_loc_id = %id, "order line references an unknown sku_loc");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn allocate_into(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
        occurred_at: DateTime<Utc>,
        queue: &mut Queue,
    ) -> Result<AllocationPlan<(SalesOrderId, u32)>, AllocationError> {
        let sku_loc = self
            .read_models
            .sku_locs
            .get(tenant_id, &sku_loc_id)
            .ok_or(AllocationError::SkuLocNotFound(sku_loc_id))?;
        let lines = self.read_models.sales_orders.lines_for(tenant_id, sku_loc_id);
        let plan = sku_loc.allocate_available_qty(&lines);

        let mut by_order: BTreeMap<SalesOrderId, Vec<AllocateLine>> = BTreeMap::new();
        for allocation in &plan.allocations {
            let (order_id, line_no) = allocation.line;
            let uom_size = lines
                .iter()
                .find(|l| l.key() == allocation.line)
                .map(SkuLocLine::uom_size)
                .unwrap_or(1);
            by_order.entry(order_id).or_default().push(AllocateLine {
                line_no,
                available_ea: allocation.qty * uom_size,
            });
        }

        for (order_id, lines) in by_order {
            let command = SalesOrderCommand::AllocateLines(AllocateLines {
                tenant_id,
                order_id,
                lines,
                occurred_at,
            });
            self.dispatch_into(
                tenant_id,
                order_id.aggregate_id(),
                aggregate_types::SALES_ORDER,
                command,
                |id| SalesOrder::empty(SalesOrderId::new(id)),
                queue,
            )?;
        }

        if !plan.is_empty() {
            debug!(
                %tenant_id,
                %sku_loc_id,
                lines = plan.allocations.len(),
                qty_available = plan.qty_available,
                "allocated available qty"
            );
        }
        self.refresh_into(tenant_id, sku_loc_id, occurred_at, queue)?;
        Ok(plan)
    }

    fn refresh_into(
        &self,
        tenant_id: TenantId,
        sku_loc_id: SkuLocId,
        occurred_at: DateTime<Utc>,
        queue: &mut Queue,
    ) -> Result<(), AllocationError> {
        let orders = &self.read_models.sales_orders;
        let command = SkuLocCommand::Rebuild(Rebuild {
            tenant_id,
            sku_loc_id,
            so_lines: orders.allocated_qtys_for(tenant_id, sku_loc_id),
            pt_lines: orders.picking_qtys_for(tenant_id, sku_loc_id),
            occurred_at,
        });
        self.dispatch_into(
            tenant_id,
            sku_loc_id.aggregate_id(),
            aggregate_types::SKU_LOC,
            command,
            |id| SkuLoc::empty(SkuLocId::new(id)),
            queue,
        )
    }

    fn record_invoice_into(&self, posted: &InvoicePosted, queue: &mut Queue) -> Result<(), AllocationError> {
        let command = SalesOrderCommand::RecordInvoice(RecordInvoice {
            tenant_id: posted.tenant_id,
            order_id: posted.sales_order_id,
            invoice_id: posted.invoice_id.aggregate_id(),
            pick_ticket_id: posted.pick_ticket_id,
            lines: InvoiceLines::invoiced_qtys(&posted.lines),
            occurred_at: posted.occurred_at,
        });
        self.dispatch_into(
            posted.tenant_id,
            posted.sales_order_id.aggregate_id(),
            aggregate_types::SALES_ORDER,
            command,
            |id| SalesOrder::empty(SalesOrderId::new(id)),
            queue,
        )
    }

    fn dispatch_into<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make: fn(AggregateId) -> A,
        queue: &mut Queue,
    ) -> Result<(), AllocationError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch(tenant_id, aggregate_id, aggregate_type, command, |_, id| make(id))?;
        queue.extend(self.read_models.sync(self.dispatcher.store()));
        Ok(())
    }
}

fn decode<E: DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
    aggregate_type: &'static str,
) -> Result<E, AllocationError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| AllocationError::Decode {
        aggregate_type,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use stockor_inventory::ReceiveQty;
    use stockor_invoicing::CreateInvoice;
    use stockor_sales::{CancelSalesOrder, CreatePickTicket, InvoicedQty, PickTicketId};

    use crate::testing::Harness;

    #[test]
    fn new_order_takes_available_stock() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 5);

        let order_id = h.order(&[(&hat, 3)]);

        let order = h.read_models.sales_orders.get(h.tenant, &order_id).unwrap();
        assert_eq!(order.number_of_lines_fully_allocated(), 1);
        let sl = h.read_models.sku_locs.get(h.tenant, &hat.id_typed()).unwrap();
        assert_eq!(sl.qty_allocated(), 3);
        assert_eq!(sl.qty_available(), 2);
    }

    #[test]
    fn oldest_lines_are_served_first_when_stock_arrives() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 0);

        let first = h.order(&[(&hat, 4)]);
        let second = h.order(&[(&hat, 4)]);
        assert!(!h.read_models.sales_orders.get(h.tenant, &first).unwrap().is_allocated());

        h.receive(&hat, 6);

        let first = h.read_models.sales_orders.get(h.tenant, &first).unwrap();
        let second = h.read_models.sales_orders.get(h.tenant, &second).unwrap();
        assert_eq!(first.lines()[0].qty_allocated, 4);
        assert_eq!(second.lines()[0].qty_allocated, 2);

        let sl = h.read_models.sku_locs.get(h.tenant, &hat.id_typed()).unwrap();
        assert_eq!(sl.qty_allocated(), 6);
        assert_eq!(sl.qty_available(), 0);
        assert_eq!(h.read_models.sales_orders.allocated(h.tenant).len(), 2);
    }

    #[test]
    fn canceling_releases_stock_to_waiting_orders() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 3);
        let first = h.order(&[(&hat, 3)]);
        let second = h.order(&[(&hat, 2)]);

        let cancel = SalesOrderCommand::Cancel(CancelSalesOrder {
            tenant_id: h.tenant,
            order_id: first,
            occurred_at: Utc::now(),
        });
        h.run_order(first, cancel);

        let second = h.read_models.sales_orders.get(h.tenant, &second).unwrap();
        assert!(second.lines()[0].is_fully_allocated());
        let sl = h.read_models.sku_locs.get(h.tenant, &hat.id_typed()).unwrap();
        assert_eq!(sl.qty_allocated(), 2);
    }

    #[test]
    fn picking_moves_between_caches() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 5);
        let order_id = h.order(&[(&hat, 5)]);

        let pick = SalesOrderCommand::CreatePickTicket(CreatePickTicket {
            tenant_id: h.tenant,
            order_id,
            ticket_id: PickTicketId::generate(),
            occurred_at: Utc::now(),
        });
        h.run_order(order_id, pick);

        let sl = h.read_models.sku_locs.get(h.tenant, &hat.id_typed()).unwrap();
        assert_eq!(sl.qty_allocated(), 0);
        assert_eq!(sl.qty_picking(), 5);
        assert_eq!(sl.qty_available(), 0);
    }

    /// An open invoice billing what the order has allocated.
    fn invoice_for(h: &Harness, order_id: SalesOrderId) -> InvoiceId {
        let order = h.read_models.sales_orders.get(h.tenant, &order_id).unwrap();
        let invoice_id = InvoiceId::generate();
        let create = InvoiceCommand::Create(CreateInvoice {
            tenant_id: h.tenant,
            invoice_id,
            sales_order_id: order_id,
            pick_ticket_id: None,
            customer_code: order.customer().code.clone(),
            terms_code: order.terms_code().to_string(),
            invoice_date: None,
            lines: InvoiceLines::from_sales_order(&order),
            occurred_at: Utc::now(),
        });
        h.run_invoice(invoice_id, create);
        invoice_id
    }

    #[test]
    fn posted_invoice_is_recorded_on_the_order() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 5);
        let order_id = h.order(&[(&hat, 2)]);

        let invoice_id = invoice_for(&h, order_id);
        h.allocation().post_invoice(h.tenant, invoice_id, Utc::now()).unwrap();
        h.settle();

        let order = h.read_models.sales_orders.get(h.tenant, &order_id).unwrap();
        assert_eq!(order.lines()[0].qty_invoiced, 2);
        assert_eq!(order.lines()[0].qty_allocated, 0);
        let sl = h.read_models.sku_locs.get(h.tenant, &hat.id_typed()).unwrap();
        assert_eq!(sl.qty_allocated(), 0);
        assert_eq!(sl.mac(), Decimal::ONE);
    }

    #[test]
    fn a_second_invoice_for_a_billed_order_is_not_posted() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 5);
        let order_id = h.order(&[(&hat, 2)]);
        let first = invoice_for(&h, order_id);
        let second = invoice_for(&h, order_id);

        h.allocation().post_invoice(h.tenant, first, Utc::now()).unwrap();
        h.settle();

        let err = h.allocation().post_invoice(h.tenant, second, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::Dispatch(DispatchError::Conflict(ref m)) if m == "sales order is complete"
        ));
        h.settle();

        let second = h.read_models.invoices.get(h.tenant, &second).unwrap();
        assert_eq!(second.state(), InvoiceState::Open);
        let order = h.read_models.sales_orders.get(h.tenant, &order_id).unwrap();
        assert_eq!(order.lines()[0].qty_invoiced, 2);
    }

    #[test]
    fn a_failed_reaction_does_not_stop_the_queue() {
        let h = Harness::new();
        let hat = h.stock("HAT", "DEFAULT", 5);
        let order_id = h.order(&[(&hat, 2)]);
        let first = invoice_for(&h, order_id);
        let second = invoice_for(&h, order_id);
        h.allocation().post_invoice(h.tenant, first, Utc::now()).unwrap();
        h.settle();

        let coat = h.stock("COAT", "DEFAULT", 0);
        let waiting = h.order(&[(&coat, 3)]);

        // Both commit before anything reacts: recording the second invoice
        // fails, receiving the coats must still allocate them.
        let post = InvoiceCommand::Post(PostInvoice {
            tenant_id: h.tenant,
            invoice_id: second,
            shippable: vec![InvoicedQty { line_no: 1, qty: 2 }],
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(h.tenant, second.aggregate_id(), aggregate_types::INVOICE, post, |_, id| {
                Invoice::empty(InvoiceId::new(id))
            })
            .unwrap();
        let receive = SkuLocCommand::Receive(ReceiveQty {
            tenant_id: h.tenant,
            sku_loc_id: coat.id_typed(),
            qty: 3,
            unit_cost: Decimal::ONE,
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(h.tenant, coat.id_typed().aggregate_id(), aggregate_types::SKU_LOC, receive, |_, id| {
                SkuLoc::empty(SkuLocId::new(id))
            })
            .unwrap();

        let envelopes = h.read_models.sync(h.dispatcher.store());
        let err = h.allocation().settle(envelopes).unwrap_err();
        assert!(matches!(err, AllocationError::Dispatch(DispatchError::Conflict(_))));

        let waiting = h.read_models.sales_orders.get(h.tenant, &waiting).unwrap();
        assert_eq!(waiting.lines()[0].qty_allocated, 3);
        let coat = h.read_models.sku_locs.get(h.tenant, &coat.id_typed()).unwrap();
        assert_eq!(coat.qty_allocated(), 3);
    }
}
