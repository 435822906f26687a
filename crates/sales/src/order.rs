use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateId, AggregateRoot, Configuration, DomainError, Entity, TenantId};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};
use stockor_inventory::{LineQty, LocationRef, SkuLocId};
use stockor_parties::BusinessEntityId;

use crate::line::{OrderedLine, SoLine};
use crate::pick_ticket::{PickTicket, PickTicketId, PtLine};

stockor_core::model_id!(SalesOrderId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderState {
    Open,
    Complete,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: Option<BusinessEntityId>,
    pub code: String,
}

/// Aggregate root: SalesOrder, with its lines and pick tickets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    customer: CustomerRef,
    location: LocationRef,
    terms_code: String,
    order_date: NaiveDate,
    state: SalesOrderState,
    lines: Vec<SoLine>,
    pick_tickets: Vec<PickTicket>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer: CustomerRef::default(),
            location: LocationRef::default(),
            terms_code: String::new(),
            order_date: NaiveDate::default(),
            state: SalesOrderState::Open,
            lines: Vec::new(),
            pick_tickets: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer(&self) -> &CustomerRef {
        &self.customer
    }

    pub fn location(&self) -> &LocationRef {
        &self.location
    }

    pub fn terms_code(&self) -> &str {
        &self.terms_code
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn state(&self) -> SalesOrderState {
        self.state
    }

    pub fn lines(&self) -> &[SoLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&SoLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn pick_tickets(&self) -> &[PickTicket] {
        &self.pick_tickets
    }

    pub fn pick_ticket(&self, id: PickTicketId) -> Option<&PickTicket> {
        self.pick_tickets.iter().find(|pt| pt.id == id)
    }

    pub fn open_pick_tickets(&self) -> impl Iterator<Item = &PickTicket> {
        self.pick_tickets.iter().filter(|pt| !pt.is_complete)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_open(&self) -> bool {
        self.state == SalesOrderState::Open
    }

    /// At least one line holds allocated stock.
    pub fn is_allocated(&self) -> bool {
        self.lines.iter().any(SoLine::is_allocated)
    }

    pub fn number_of_lines_allocated(&self) -> usize {
        self.lines.iter().filter(|l| l.is_allocated()).count()
    }

    pub fn number_of_lines_fully_allocated(&self) -> usize {
        self.lines.iter().filter(|l| l.is_fully_allocated()).count()
    }

    pub fn pickable_lines(&self) -> impl Iterator<Item = &SoLine> {
        self.lines.iter().filter(|l| l.is_pickable())
    }

    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(SoLine::extended_price)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Lines as the allocator sees them. Closed orders take no stock.
    pub fn allocation_lines(&self) -> Vec<OrderedLine> {
        if !self.is_open() {
            return Vec::new();
        }
        self.lines
            .iter()
            .map(|line| OrderedLine {
                order_id: self.id,
                line: line.clone(),
            })
            .collect()
    }

    /// Allocated eaches per line, for a sku-loc's allocation cache.
    pub fn allocated_qtys(&self) -> Vec<LineQty> {
        self.allocation_lines().iter().map(LineQty::allocated).collect()
    }

    /// Picking eaches from the open pick tickets.
    pub fn picking_qtys(&self) -> Vec<LineQty> {
        self.open_pick_tickets().flat_map(PickTicket::picking_qtys).collect()
    }

    /// What each line can still bill: the pick ticket's qty to ship, or the
    /// allocated qty when no ticket is named. Fails once the order or the
    /// ticket is closed.
    pub fn shippable_qtys(&self, pick_ticket_id: Option<PickTicketId>) -> Result<Vec<InvoicedQty>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_state_open()?;
        let ticket = match pick_ticket_id {
            Some(id) => {
                let pt = self.pick_ticket(id).ok_or_else(DomainError::not_found)?;
                if pt.is_complete {
                    return Err(DomainError::conflict("pick ticket is already complete"));
                }
                Some(pt)
            }
            None => None,
        };
        Ok(self
            .lines
            .iter()
            .map(|line| InvoicedQty {
                line_no: line.line_no,
                qty: match ticket {
                    Some(pt) => pt.line_for(line.line_no).map(PtLine::qty_to_ship).unwrap_or(0),
                    None => line.qty_allocated,
                },
            })
            .collect())
    }

    /// Sku-locs any line draws from.
    pub fn sku_loc_ids(&self) -> Vec<SkuLocId> {
        let mut ids: Vec<SkuLocId> = self.lines.iter().map(|l| l.sku_loc_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn view(&self) -> SalesOrderView<'_> {
        SalesOrderView {
            id: self.id,
            customer_id: self.customer.id,
            customer_code: &self.customer.code,
            location_id: self.location.id,
            location_code: &self.location.code,
            terms_code: &self.terms_code,
            order_date: self.order_date,
            state: self.state,
            lines: self
                .lines
                .iter()
                .map(|line| SoLineView {
                    sales_order_id: self.id,
                    ea_qty_allocated: line.ea_qty_allocated(),
                    is_fully_allocated: line.is_fully_allocated(),
                    extended_price: line.extended_price(),
                    line,
                })
                .collect(),
            pick_tickets: self
                .pick_tickets
                .iter()
                .map(|pt| PickTicketView {
                    id: pt.id,
                    sales_order_id: self.id,
                    is_complete: pt.is_complete,
                    created_at: pt.created_at,
                    lines: pt
                        .lines
                        .iter()
                        .map(|line| PtLineView {
                            qty_to_ship: line.qty_to_ship(),
                            line,
                        })
                        .collect(),
                })
                .collect(),
            number_of_lines_allocated: self.number_of_lines_allocated(),
            number_of_lines_fully_allocated: self.number_of_lines_fully_allocated(),
            total: self.total(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SalesOrderView<'a> {
    pub id: SalesOrderId,
    pub customer_id: Option<BusinessEntityId>,
    pub customer_code: &'a str,
    pub location_id: Option<stockor_inventory::LocationId>,
    pub location_code: &'a str,
    pub terms_code: &'a str,
    pub order_date: NaiveDate,
    pub state: SalesOrderState,
    pub lines: Vec<SoLineView<'a>>,
    pub pick_tickets: Vec<PickTicketView<'a>>,
    pub number_of_lines_allocated: usize,
    pub number_of_lines_fully_allocated: usize,
    pub total: Decimal,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SoLineView<'a> {
    pub sales_order_id: SalesOrderId,
    #[serde(flatten)]
    pub line: &'a SoLine,
    pub ea_qty_allocated: i64,
    pub is_fully_allocated: bool,
    pub extended_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PickTicketView<'a> {
    pub id: PickTicketId,
    pub sales_order_id: SalesOrderId,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<PtLineView<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PtLineView<'a> {
    #[serde(flatten)]
    pub line: &'a PtLine,
    pub qty_to_ship: i64,
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Entity for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn model_name() -> &'static str {
        "sales_order"
    }
}

impl Exportable for SalesOrder {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("sales_order")
            .with_tracked_columns([
                "customer_id",
                "customer_code",
                "location_id",
                "location_code",
                "terms_code",
                "order_date",
                "state",
            ])
            .belongs_to("customer", "customer")
            .belongs_to("location", "location")
            .has_many_writable("lines", "so_line")
            .has_many("pick_tickets", "pick_ticket")
            .export_methods([
                "number_of_lines_allocated",
                "number_of_lines_fully_allocated",
                "total",
            ])
    }
}

/// A line as entered on a new or existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub sku_loc_id: SkuLocId,
    pub sku_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uom_size: Option<i64>,
    pub qty: i64,
    pub price: Decimal,
}

/// A sku stocked in the location an order is moving to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockedSku {
    pub sku_code: String,
    pub sku_loc_id: SkuLocId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer: CustomerRef,
    pub location: LocationRef,
    /// Configured customer terms when absent.
    pub terms_code: Option<String>,
    /// The day of `occurred_at` when absent.
    pub order_date: Option<NaiveDate>,
    pub lines: Vec<NewLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line: NewLine,
    pub occurred_at: DateTime<Utc>,
}

/// Move the order to another location. `stocked` lists the skus the new
/// location carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLocation {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub location: LocationRef,
    pub stocked: Vec<StockedSku>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateLine {
    pub line_no: u32,
    pub available_ea: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateLines {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub lines: Vec<AllocateLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePickTicket {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub ticket_id: PickTicketId,
    pub occurred_at: DateTime<Utc>,
}

/// Complete a ticket (anything not invoiced is released) or cancel it
/// (picking goes back to allocated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePickTicket {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub ticket_id: PickTicketId,
    pub cancel: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicedQty {
    pub line_no: u32,
    pub qty: i64,
}

/// Record an invoice against the order. Invoices made from a pick ticket
/// ship picking units; others ship allocated units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoice {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub lines: Vec<InvoicedQty>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSalesOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    Create(CreateSalesOrder),
    AddLine(AddLine),
    ChangeLocation(ChangeLocation),
    AllocateLines(AllocateLines),
    CreatePickTicket(CreatePickTicket),
    ClosePickTicket(ClosePickTicket),
    RecordInvoice(RecordInvoice),
    Cancel(CancelSalesOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer: CustomerRef,
    pub location: LocationRef,
    pub terms_code: String,
    pub order_date: NaiveDate,
    pub lines: Vec<SoLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line: SoLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMoved {
    pub line_no: u32,
    pub sku_loc_id: SkuLocId,
}

/// Lines moved to the new location's sku-locs lose their allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationChanged {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub location: LocationRef,
    pub moves: Vec<LineMoved>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAllocated {
    pub line_no: u32,
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesAllocated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub lines: Vec<LineAllocated>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTicketCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub ticket: PickTicket,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTicketClosed {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub ticket_id: PickTicketId,
    pub canceled: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecorded {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub lines: Vec<InvoicedQty>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderCanceled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    /// Open pick tickets, marked complete by the cancel.
    pub pick_tickets: Vec<PickTicketId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    Created(SalesOrderCreated),
    LineAdded(LineAdded),
    LocationChanged(LocationChanged),
    LinesAllocated(LinesAllocated),
    PickTicketCreated(PickTicketCreated),
    PickTicketClosed(PickTicketClosed),
    InvoiceRecorded(InvoiceRecorded),
    Canceled(SalesOrderCanceled),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::Created(_) => "sales.sales_order.created",
            SalesOrderEvent::LineAdded(_) => "sales.sales_order.line_added",
            SalesOrderEvent::LocationChanged(_) => "sales.sales_order.location_changed",
            SalesOrderEvent::LinesAllocated(_) => "sales.sales_order.lines_allocated",
            SalesOrderEvent::PickTicketCreated(_) => "sales.sales_order.pick_ticket_created",
            SalesOrderEvent::PickTicketClosed(_) => "sales.sales_order.pick_ticket_closed",
            SalesOrderEvent::InvoiceRecorded(_) => "sales.sales_order.invoice_recorded",
            SalesOrderEvent::Canceled(_) => "sales.sales_order.canceled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::Created(e) => e.occurred_at,
            SalesOrderEvent::LineAdded(e) => e.occurred_at,
            SalesOrderEvent::LocationChanged(e) => e.occurred_at,
            SalesOrderEvent::LinesAllocated(e) => e.occurred_at,
            SalesOrderEvent::PickTicketCreated(e) => e.occurred_at,
            SalesOrderEvent::PickTicketClosed(e) => e.occurred_at,
            SalesOrderEvent::InvoiceRecorded(e) => e.occurred_at,
            SalesOrderEvent::Canceled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::Created(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer = e.customer.clone();
                self.location = e.location.clone();
                self.terms_code = e.terms_code.clone();
                self.order_date = e.order_date;
                self.lines = e.lines.clone();
                self.state = SalesOrderState::Open;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SalesOrderEvent::LineAdded(e) => self.lines.push(e.line.clone()),
            SalesOrderEvent::LocationChanged(e) => {
                self.location = e.location.clone();
                for m in &e.moves {
                    if let Some(line) = self.line_mut(m.line_no) {
                        line.sku_loc_id = m.sku_loc_id;
                        line.qty_allocated = 0;
                    }
                }
            }
            SalesOrderEvent::LinesAllocated(e) => {
                for a in &e.lines {
                    if let Some(line) = self.line_mut(a.line_no) {
                        line.qty_allocated += a.qty;
                    }
                }
            }
            SalesOrderEvent::PickTicketCreated(e) => {
                for pt_line in &e.ticket.lines {
                    if let Some(line) = self.line_mut(pt_line.so_line_no) {
                        line.qty_allocated -= pt_line.qty;
                        line.qty_picking += pt_line.qty;
                    }
                }
                self.pick_tickets.push(e.ticket.clone());
            }
            SalesOrderEvent::PickTicketClosed(e) => self.close_ticket(e.ticket_id, e.canceled),
            SalesOrderEvent::InvoiceRecorded(e) => {
                for inv in &e.lines {
                    if let Some(line) = self.line_mut(inv.line_no) {
                        line.qty_invoiced += inv.qty;
                        if e.pick_ticket_id.is_some() {
                            line.qty_picking = (line.qty_picking - inv.qty).max(0);
                        } else {
                            line.qty_allocated = (line.qty_allocated - inv.qty).max(0);
                        }
                    }
                }
                if let Some(ticket_id) = e.pick_ticket_id {
                    if let Some(pt) = self.pick_tickets.iter_mut().find(|pt| pt.id == ticket_id) {
                        for inv in &e.lines {
                            if let Some(pt_line) = pt.lines.iter_mut().find(|l| l.so_line_no == inv.line_no) {
                                pt_line.qty_invoiced += inv.qty;
                            }
                        }
                        if pt.lines.iter().all(|l| !l.is_picking()) {
                            pt.is_complete = true;
                        }
                    }
                }
                if !self.lines.is_empty() && self.lines.iter().all(SoLine::is_closed) {
                    self.state = SalesOrderState::Complete;
                }
            }
            SalesOrderEvent::Canceled(e) => {
                for line in &mut self.lines {
                    line.qty_canceled = (line.qty - line.qty_invoiced).max(0);
                    line.qty_allocated = 0;
                    line.qty_picking = 0;
                }
                for pt in &mut self.pick_tickets {
                    if e.pick_tickets.contains(&pt.id) {
                        pt.is_complete = true;
                    }
                }
                self.state = SalesOrderState::Canceled;
            }
        }
        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::Create(cmd) => self.handle_create(cmd),
            SalesOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SalesOrderCommand::ChangeLocation(cmd) => self.handle_change_location(cmd),
            SalesOrderCommand::AllocateLines(cmd) => self.handle_allocate(cmd),
            SalesOrderCommand::CreatePickTicket(cmd) => self.handle_create_pick_ticket(cmd),
            SalesOrderCommand::ClosePickTicket(cmd) => self.handle_close_pick_ticket(cmd),
            SalesOrderCommand::RecordInvoice(cmd) => self.handle_record_invoice(cmd),
            SalesOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl SalesOrder {
    fn line_mut(&mut self, line_no: u32) -> Option<&mut SoLine> {
        self.lines.iter_mut().find(|l| l.line_no == line_no)
    }

    fn close_ticket(&mut self, ticket_id: PickTicketId, canceled: bool) {
        let Some(pt) = self.pick_tickets.iter_mut().find(|pt| pt.id == ticket_id) else {
            return;
        };
        pt.is_complete = true;
        let releases: Vec<(u32, i64)> = pt.lines.iter().map(|l| (l.so_line_no, l.qty_to_ship())).collect();
        for (line_no, qty) in releases {
            if let Some(line) = self.line_mut(line_no) {
                let released = qty.min(line.qty_picking);
                line.qty_picking -= released;
                if canceled {
                    line.qty_allocated += released;
                }
            }
        }
    }

    /// Every mutation after creation needs an existing open order of the same
    /// tenant.
    fn ensure_open(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        self.ensure_state_open()
    }

    fn ensure_state_open(&self) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::conflict(format!(
                "sales order is {}",
                match self.state {
                    SalesOrderState::Open => "open",
                    SalesOrderState::Complete => "complete",
                    SalesOrderState::Canceled => "canceled",
                }
            )));
        }
        Ok(())
    }

    fn next_line_no(&self) -> u32 {
        self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1
    }

    fn build_line(line_no: u32, new: &NewLine, created_at: DateTime<Utc>) -> Result<SoLine, DomainError> {
        if new.sku_code.trim().is_empty() {
            return Err(DomainError::validation(format!("line {line_no}: sku must be set")));
        }
        if new.qty <= 0 {
            return Err(DomainError::validation(format!("line {line_no}: qty must be positive")));
        }
        let uom_size = new.uom_size.unwrap_or(1);
        if uom_size < 1 {
            return Err(DomainError::validation(format!("line {line_no}: uom_size must be at least 1")));
        }
        if new.price < Decimal::ZERO {
            return Err(DomainError::validation(format!("line {line_no}: price cannot be negative")));
        }
        if new.price.checked_mul(Decimal::from(new.qty)).is_none() {
            return Err(DomainError::validation(format!("line {line_no}: extended price overflows")));
        }
        Ok(SoLine {
            line_no,
            sku_loc_id: new.sku_loc_id,
            sku_code: new.sku_code.trim().to_ascii_uppercase(),
            description: new.description.clone(),
            uom_size,
            qty: new.qty,
            price: new.price,
            qty_allocated: 0,
            qty_picking: 0,
            qty_invoiced: 0,
            qty_canceled: 0,
            created_at,
        })
    }

    fn handle_create(&self, cmd: &CreateSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }
        if cmd.customer.id.is_none() {
            return Err(DomainError::validation("customer must be set"));
        }
        if cmd.location.id.is_none() || cmd.location.code.trim().is_empty() {
            return Err(DomainError::validation("location must be set"));
        }

        let lines = cmd
            .lines
            .iter()
            .zip(1u32..)
            .map(|(new, line_no)| Self::build_line(line_no, new, cmd.occurred_at))
            .collect::<Result<Vec<_>, _>>()?;
        let terms_code = cmd
            .terms_code
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Configuration::global().customer_terms_code().to_string());

        Ok(vec![SalesOrderEvent::Created(SalesOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer: cmd.customer.clone(),
            location: cmd.location.clone(),
            terms_code,
            order_date: cmd.order_date.unwrap_or_else(|| cmd.occurred_at.date_naive()),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        let line = Self::build_line(self.next_line_no(), &cmd.line, cmd.occurred_at)?;
        Ok(vec![SalesOrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_location(&self, cmd: &ChangeLocation) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        if cmd.location.id.is_none() {
            return Err(DomainError::validation("location must be set"));
        }
        if cmd.location.id == self.location.id {
            return Ok(Vec::new());
        }
        if self.lines.iter().any(|l| l.qty_picking > 0) {
            return Err(DomainError::validation("location cannot change while lines are picking"));
        }

        let mut missing: Vec<&str> = Vec::new();
        let mut moves = Vec::new();
        for line in &self.lines {
            match cmd.stocked.iter().find(|s| s.sku_code.eq_ignore_ascii_case(&line.sku_code)) {
                Some(stocked) => moves.push(LineMoved {
                    line_no: line.line_no,
                    sku_loc_id: stocked.sku_loc_id,
                }),
                None if !missing.contains(&line.sku_code.as_str()) => missing.push(&line.sku_code),
                None => {}
            }
        }
        if !missing.is_empty() {
            return Err(DomainError::validation(format!(
                "Location {} does not have skus {}",
                cmd.location.code,
                missing.join(", ")
            )));
        }

        Ok(vec![SalesOrderEvent::LocationChanged(LocationChanged {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            location: cmd.location.clone(),
            moves,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateLines) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;

        let mut allocated = Vec::new();
        for req in &cmd.lines {
            let mut line = self
                .line(req.line_no)
                .cloned()
                .ok_or_else(|| DomainError::validation(format!("line {} does not exist", req.line_no)))?;
            let qty = line.allocate_max_available(req.available_ea);
            if qty > 0 {
                allocated.push(LineAllocated {
                    line_no: req.line_no,
                    qty,
                });
            }
        }
        if allocated.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![SalesOrderEvent::LinesAllocated(LinesAllocated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            lines: allocated,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_create_pick_ticket(&self, cmd: &CreatePickTicket) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        if self.pick_ticket(cmd.ticket_id).is_some() {
            return Err(DomainError::conflict("pick ticket already exists"));
        }
        let lines: Vec<PtLine> = self
            .pickable_lines()
            .map(|l| PtLine {
                so_line_no: l.line_no,
                sku_loc_id: l.sku_loc_id,
                sku_code: l.sku_code.clone(),
                uom_size: l.uom_size,
                qty: l.qty_allocated,
                qty_invoiced: 0,
            })
            .collect();
        if lines.is_empty() {
            return Err(DomainError::validation("sales order has no allocated lines to pick"));
        }

        Ok(vec![SalesOrderEvent::PickTicketCreated(PickTicketCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            ticket: PickTicket {
                id: cmd.ticket_id,
                lines,
                is_complete: false,
                created_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_pick_ticket(&self, cmd: &ClosePickTicket) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        let pt = self.pick_ticket(cmd.ticket_id).ok_or_else(DomainError::not_found)?;
        if pt.is_complete {
            return Err(DomainError::conflict("pick ticket is already complete"));
        }
        Ok(vec![SalesOrderEvent::PickTicketClosed(PickTicketClosed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            ticket_id: cmd.ticket_id,
            canceled: cmd.cancel,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_invoice(&self, cmd: &RecordInvoice) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        let shippable = self.shippable_qtys(cmd.pick_ticket_id)?;

        let mut lines = Vec::new();
        for inv in &cmd.lines {
            if inv.qty == 0 {
                continue;
            }
            let max = shippable
                .iter()
                .find(|s| s.line_no == inv.line_no)
                .map(|s| s.qty)
                .ok_or_else(|| DomainError::validation(format!("line {} does not exist", inv.line_no)))?;
            if inv.qty < 0 || inv.qty > max {
                return Err(DomainError::validation(format!(
                    "line {} can invoice at most {max}",
                    inv.line_no
                )));
            }
            lines.push(*inv);
        }
        if lines.is_empty() {
            return Err(DomainError::validation("invoice has no quantities"));
        }

        Ok(vec![SalesOrderEvent::InvoiceRecorded(InvoiceRecorded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            pick_ticket_id: cmd.pick_ticket_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSalesOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_open(cmd.tenant_id, cmd.order_id)?;
        Ok(vec![SalesOrderEvent::Canceled(SalesOrderCanceled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            pick_tickets: self.open_pick_tickets().map(|pt| pt.id).collect(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockor_events::execute;
    use stockor_inventory::LocationId;

    struct Fixture {
        tenant_id: TenantId,
        order: SalesOrder,
        string_loc: SkuLocId,
    }

    fn default_location() -> LocationRef {
        LocationRef {
            id: Some(LocationId::generate()),
            code: "DEFAULT".into(),
            name: "Default".into(),
        }
    }

    fn string_line(sku_loc_id: SkuLocId, qty: i64) -> NewLine {
        NewLine {
            sku_loc_id,
            sku_code: "STRING".into(),
            description: "Ball of string".into(),
            uom_size: None,
            qty,
            price: Decimal::new(250, 2),
        }
    }

    fn first_order() -> Fixture {
        let tenant_id = TenantId::new();
        let order_id = SalesOrderId::generate();
        let string_loc = SkuLocId::generate();
        let mut order = SalesOrder::empty(order_id);
        let cmd = SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id,
            order_id,
            customer: CustomerRef {
                id: Some(BusinessEntityId::generate()),
                code: "STITT".into(),
            },
            location: default_location(),
            terms_code: None,
            order_date: None,
            lines: vec![string_line(string_loc, 20)],
            occurred_at: Utc::now(),
        });
        execute(&mut order, &cmd).unwrap();
        Fixture {
            tenant_id,
            order,
            string_loc,
        }
    }

    fn allocate(f: &mut Fixture, line_no: u32, available_ea: i64) {
        let cmd = SalesOrderCommand::AllocateLines(AllocateLines {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            lines: vec![AllocateLine { line_no, available_ea }],
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &cmd).unwrap();
    }

    fn create_pick_ticket(f: &mut Fixture) -> PickTicketId {
        let ticket_id = PickTicketId::generate();
        let cmd = SalesOrderCommand::CreatePickTicket(CreatePickTicket {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            ticket_id,
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &cmd).unwrap();
        ticket_id
    }

    #[test]
    fn order_date_defaults_to_today() {
        let f = first_order();
        assert_eq!(f.order.order_date(), Utc::now().date_naive());
        assert_eq!(f.order.terms_code(), "CASH");
        assert_eq!(f.order.state(), SalesOrderState::Open);
    }

    #[test]
    fn changing_location_requires_the_skus_there() {
        let mut f = first_order();
        let amazon = LocationRef {
            id: Some(LocationId::generate()),
            code: "AMAZON".into(),
            name: "Amazon".into(),
        };
        let mut cmd = ChangeLocation {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            location: amazon.clone(),
            stocked: vec![],
            occurred_at: Utc::now(),
        };

        let err = f
            .order
            .handle(&SalesOrderCommand::ChangeLocation(cmd.clone()))
            .unwrap_err();
        assert_eq!(err.message(), "Location AMAZON does not have skus STRING");

        let amazon_string = SkuLocId::generate();
        cmd.stocked.push(StockedSku {
            sku_code: "STRING".into(),
            sku_loc_id: amazon_string,
        });
        execute(&mut f.order, &SalesOrderCommand::ChangeLocation(cmd)).unwrap();
        assert_eq!(f.order.location().code, "AMAZON");
        assert_eq!(f.order.lines()[0].sku_loc_id, amazon_string);
    }

    #[test]
    fn allocation_counts() {
        let mut f = first_order();
        allocate(&mut f, 1, 1);

        assert!(f.order.is_allocated());
        assert_eq!(f.order.number_of_lines_allocated(), 1);
        assert_eq!(f.order.number_of_lines_fully_allocated(), 0);
        assert_eq!(
            f.order.allocated_qtys(),
            vec![LineQty {
                sku_loc_id: f.string_loc,
                ea_qty: 1
            }]
        );
    }

    #[test]
    fn picking_moves_allocated_to_picking() {
        let mut f = first_order();
        allocate(&mut f, 1, 20);
        assert_eq!(f.order.pickable_lines().count(), 1);
        assert_eq!(f.order.pickable_lines().next().map(|l| l.qty_allocated), Some(20));

        let ticket_id = create_pick_ticket(&mut f);

        assert_eq!(f.order.pick_ticket(ticket_id).map(|pt| pt.lines.len()), Some(1));
        assert_eq!(f.order.pickable_lines().count(), 0);
        assert_eq!(f.order.lines()[0].qty_picking, 20);
        assert_eq!(f.order.picking_qtys()[0].ea_qty, 20);
    }

    #[test]
    fn canceling_releases_picking_and_completes_tickets() {
        let mut f = first_order();
        allocate(&mut f, 1, 1);
        let ticket_id = create_pick_ticket(&mut f);
        assert_eq!(f.order.lines()[0].qty_picking, 1);
        assert!(!f.order.pick_ticket(ticket_id).unwrap().is_complete);

        let cancel = SalesOrderCommand::Cancel(CancelSalesOrder {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &cancel).unwrap();

        assert_eq!(f.order.state(), SalesOrderState::Canceled);
        assert_eq!(f.order.lines()[0].qty_picking, 0);
        assert_eq!(f.order.lines()[0].qty_canceled, 20);
        assert!(f.order.pick_ticket(ticket_id).unwrap().is_complete);
        assert!(f.order.allocation_lines().is_empty());
        assert!(f.order.handle(&cancel).is_err());
    }

    #[test]
    fn canceled_pick_ticket_returns_stock_to_allocated() {
        let mut f = first_order();
        allocate(&mut f, 1, 5);
        let ticket_id = create_pick_ticket(&mut f);
        let close = SalesOrderCommand::ClosePickTicket(ClosePickTicket {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            ticket_id,
            cancel: true,
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &close).unwrap();

        assert_eq!(f.order.lines()[0].qty_picking, 0);
        assert_eq!(f.order.lines()[0].qty_allocated, 5);
        assert!(f.order.picking_qtys().is_empty());
    }

    #[test]
    fn invoicing_a_pick_ticket_completes_it_and_the_order() {
        let mut f = first_order();
        allocate(&mut f, 1, 20);
        let ticket_id = create_pick_ticket(&mut f);
        let invoice = SalesOrderCommand::RecordInvoice(RecordInvoice {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            invoice_id: AggregateId::new(),
            pick_ticket_id: Some(ticket_id),
            lines: vec![InvoicedQty { line_no: 1, qty: 20 }],
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &invoice).unwrap();

        let line = &f.order.lines()[0];
        assert_eq!(line.qty_invoiced, 20);
        assert_eq!(line.qty_picking, 0);
        assert!(f.order.pick_ticket(ticket_id).unwrap().is_complete);
        assert_eq!(f.order.state(), SalesOrderState::Complete);
    }

    #[test]
    fn cannot_invoice_more_than_allocated() {
        let mut f = first_order();
        allocate(&mut f, 1, 3);
        let invoice = SalesOrderCommand::RecordInvoice(RecordInvoice {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            invoice_id: AggregateId::new(),
            pick_ticket_id: None,
            lines: vec![InvoicedQty { line_no: 1, qty: 4 }],
            occurred_at: Utc::now(),
        });
        let err = f.order.handle(&invoice).unwrap_err();
        assert_eq!(err.message(), "line 1 can invoice at most 3");
    }

    #[test]
    fn lines_whose_extended_price_overflows_are_rejected() {
        let mut line = string_line(SkuLocId::generate(), 1_000_000_000);
        line.price = Decimal::MAX;
        let cmd = SalesOrderCommand::Create(CreateSalesOrder {
            tenant_id: TenantId::new(),
            order_id: SalesOrderId::generate(),
            customer: CustomerRef {
                id: Some(BusinessEntityId::generate()),
                code: "STITT".into(),
            },
            location: default_location(),
            terms_code: None,
            order_date: None,
            lines: vec![line],
            occurred_at: Utc::now(),
        });
        let err = SalesOrder::empty(SalesOrderId::generate()).handle(&cmd).unwrap_err();
        assert_eq!(err.message(), "line 1: extended price overflows");
    }

    #[test]
    fn shippable_qtys_close_with_the_order() {
        let mut f = first_order();
        allocate(&mut f, 1, 3);
        assert_eq!(
            f.order.shippable_qtys(None).unwrap()[0],
            InvoicedQty { line_no: 1, qty: 3 }
        );

        let ticket_id = create_pick_ticket(&mut f);
        assert_eq!(f.order.shippable_qtys(Some(ticket_id)).unwrap()[0].qty, 3);
        assert_eq!(f.order.shippable_qtys(None).unwrap()[0].qty, 0);

        let cancel = SalesOrderCommand::Cancel(CancelSalesOrder {
            tenant_id: f.tenant_id,
            order_id: f.order.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut f.order, &cancel).unwrap();
        let err = f.order.shippable_qtys(None).unwrap_err();
        assert_eq!(err.message(), "sales order is canceled");
    }

    #[test]
    fn view_includes_exported_methods() {
        let mut f = first_order();
        allocate(&mut f, 1, 2);
        let view = f.order.view();
        assert_eq!(view.number_of_lines_allocated, 1);
        assert_eq!(view.lines[0].ea_qty_allocated, 2);
        assert_eq!(view.total, Decimal::new(5000, 2));
    }
}
