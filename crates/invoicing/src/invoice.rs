use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};
use stockor_sales::{InvoicedQty, PickTicketId, SalesOrderId};

use crate::lines::InvoiceLine;

stockor_core::model_id!(InvoiceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Open,
    Posted,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    sales_order_id: Option<SalesOrderId>,
    pick_ticket_id: Option<PickTicketId>,
    customer_code: String,
    terms_code: String,
    invoice_date: NaiveDate,
    state: InvoiceState,
    lines: Vec<InvoiceLine>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Invoice {
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            sales_order_id: None,
            pick_ticket_id: None,
            customer_code: String::new(),
            terms_code: String::new(),
            invoice_date: NaiveDate::default(),
            state: InvoiceState::Open,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sales_order_id(&self) -> Option<SalesOrderId> {
        self.sales_order_id
    }

    pub fn pick_ticket_id(&self) -> Option<PickTicketId> {
        self.pick_ticket_id
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(InvoiceLine::extended_price)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Exportable for Invoice {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("invoice")
            .with_tracked_columns([
                "sales_order_id",
                "pick_ticket_id",
                "customer_code",
                "terms_code",
                "invoice_date",
                "state",
            ])
            .belongs_to("sales_order", "sales_order")
            .belongs_to("pick_ticket", "pick_ticket")
            .has_many_writable("lines", "invoice_line")
            .export_methods(["total"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub sales_order_id: SalesOrderId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub customer_code: String,
    pub terms_code: String,
    pub invoice_date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Post an open invoice. `shippable` is what the sales order can still bill
/// per line, read from the order when the command is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub shippable: Vec<InvoicedQty>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Create(CreateInvoice),
    Post(PostInvoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub sales_order_id: SalesOrderId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub customer_code: String,
    pub terms_code: String,
    pub invoice_date: NaiveDate,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Listeners record the billed quantities on the sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePosted {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub sales_order_id: SalesOrderId,
    pub pick_ticket_id: Option<PickTicketId>,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    Created(InvoiceCreated),
    Posted(InvoicePosted),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Created(_) => "invoicing.invoice.created",
            InvoiceEvent::Posted(_) => "invoicing.invoice.posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Created(e) => e.occurred_at,
            InvoiceEvent::Posted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Created(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.sales_order_id = Some(e.sales_order_id);
                self.pick_ticket_id = e.pick_ticket_id;
                self.customer_code = e.customer_code.clone();
                self.terms_code = e.terms_code.clone();
                self.invoice_date = e.invoice_date;
                self.lines = e.lines.clone();
                self.state = InvoiceState::Open;
                self.created = true;
            }
            InvoiceEvent::Posted(_) => self.state = InvoiceState::Posted,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceCommand::Post(cmd) => self.handle_post(cmd),
        }
    }
}

impl Invoice {
    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.lines.iter().any(|l| l.qty < 0) {
            return Err(DomainError::validation("invoice line qty cannot be negative"));
        }
        if cmd.lines.iter().all(|l| l.qty == 0) {
            return Err(DomainError::validation("invoice has nothing to bill"));
        }

        Ok(vec![InvoiceEvent::Created(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            sales_order_id: cmd.sales_order_id,
            pick_ticket_id: cmd.pick_ticket_id,
            customer_code: cmd.customer_code.clone(),
            terms_code: cmd.terms_code.clone(),
            invoice_date: cmd.invoice_date.unwrap_or_else(|| cmd.occurred_at.date_naive()),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.state == InvoiceState::Posted {
            return Err(DomainError::conflict("invoice is already posted"));
        }
        let sales_order_id = self
            .sales_order_id
            .ok_or_else(|| DomainError::invariant("invoice has no sales order"))?;
        for line in self.lines.iter().filter(|l| l.qty > 0) {
            let max = cmd
                .shippable
                .iter()
                .find(|s| s.line_no == line.so_line_no)
                .map(|s| s.qty)
                .unwrap_or(0);
            if line.qty > max {
                return Err(DomainError::conflict(format!(
                    "sales order line {} can bill at most {max}",
                    line.so_line_no
                )));
            }
        }

        Ok(vec![InvoiceEvent::Posted(InvoicePosted {
            tenant_id: cmd.tenant_id,
            invoice_id: self.id,
            sales_order_id,
            pick_ticket_id: self.pick_ticket_id,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
