use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, DomainError, TenantId, code};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};

stockor_core::model_id!(
    /// Payment term identifier.
    PaymentTermId
);

/// Aggregate root: PaymentTerm (`CASH`, `NET30`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentTerm {
    id: PaymentTermId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    code: String,
    days: u32,
    description: String,
    discount_days: Option<u32>,
    /// Free-form, e.g. `"2%"`.
    discount_amount: Option<String>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl PaymentTerm {
    pub fn empty(id: PaymentTermId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            days: 0,
            description: String::new(),
            discount_days: None,
            discount_amount: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentTermId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn discount_days(&self) -> Option<u32> {
        self.discount_days
    }

    pub fn discount_amount(&self) -> Option<&str> {
        self.discount_amount.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Payment due date for a document dated `from`.
    pub fn due_date(&self, from: NaiveDate) -> NaiveDate {
        from.checked_add_days(Days::new(self.days.into())).unwrap_or(from)
    }

    /// Last day the early-payment discount applies, if the term has one.
    pub fn discount_date(&self, from: NaiveDate) -> Option<NaiveDate> {
        self.discount_days
            .map(|d| from.checked_add_days(Days::new(d.into())).unwrap_or(from))
    }
}

impl AggregateRoot for PaymentTerm {
    type Id = PaymentTermId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Exportable for PaymentTerm {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("payment_term").with_tracked_columns([
            "code",
            "days",
            "description",
            "discount_days",
            "discount_amount",
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentTerm {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub code: String,
    #[serde(default)]
    pub days: u32,
    pub description: String,
    pub discount_days: Option<u32>,
    pub discount_amount: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Only the fields that are `Some` change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePaymentTerm {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub days: Option<u32>,
    pub description: Option<String>,
    pub discount_days: Option<Option<u32>>,
    pub discount_amount: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTermCommand {
    Create(CreatePaymentTerm),
    Update(UpdatePaymentTerm),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTermCreated {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub code: String,
    pub days: u32,
    pub description: String,
    pub discount_days: Option<u32>,
    pub discount_amount: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTermUpdated {
    pub tenant_id: TenantId,
    pub term_id: PaymentTermId,
    pub days: u32,
    pub description: String,
    pub discount_days: Option<u32>,
    pub discount_amount: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTermEvent {
    Created(PaymentTermCreated),
    Updated(PaymentTermUpdated),
}

impl Event for PaymentTermEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentTermEvent::Created(_) => "accounting.payment_term.created",
            PaymentTermEvent::Updated(_) => "accounting.payment_term.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentTermEvent::Created(e) => e.occurred_at,
            PaymentTermEvent::Updated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PaymentTerm {
    type Command = PaymentTermCommand;
    type Event = PaymentTermEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentTermEvent::Created(e) => {
                self.id = e.term_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.days = e.days;
                self.description = e.description.clone();
                self.discount_days = e.discount_days;
                self.discount_amount = e.discount_amount.clone();
                self.created = true;
            }
            PaymentTermEvent::Updated(e) => {
                self.days = e.days;
                self.description = e.description.clone();
                self.discount_days = e.discount_days;
                self.discount_amount = e.discount_amount.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentTermCommand::Create(cmd) => self.handle_create(cmd),
            PaymentTermCommand::Update(cmd) => self.handle_update(cmd),
        }
    }
}

fn validate_terms(description: &str, discount_days: Option<u32>, discount_amount: Option<&str>) -> Result<(), DomainError> {
    if description.trim().is_empty() {
        return Err(DomainError::validation("description cannot be empty"));
    }
    if discount_days.is_some() != discount_amount.is_some_and(|a| !a.trim().is_empty()) {
        return Err(DomainError::validation(
            "discount_days and discount_amount must be given together",
        ));
    }
    Ok(())
}

impl PaymentTerm {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePaymentTerm) -> Result<Vec<PaymentTermEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment term already exists"));
        }
        let code = code::normalize(&cmd.code);
        if code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        validate_terms(&cmd.description, cmd.discount_days, cmd.discount_amount.as_deref())?;

        Ok(vec![PaymentTermEvent::Created(PaymentTermCreated {
            tenant_id: cmd.tenant_id,
            term_id: cmd.term_id,
            code,
            days: cmd.days,
            description: cmd.description.trim().to_string(),
            discount_days: cmd.discount_days,
            discount_amount: cmd.discount_amount.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePaymentTerm) -> Result<Vec<PaymentTermEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.term_id != self.id {
            return Err(DomainError::invariant("term_id mismatch"));
        }

        let days = cmd.days.unwrap_or(self.days);
        let description = cmd.description.clone().unwrap_or_else(|| self.description.clone());
        let discount_days = cmd.discount_days.unwrap_or(self.discount_days);
        let discount_amount = cmd
            .discount_amount
            .clone()
            .unwrap_or_else(|| self.discount_amount.clone());
        validate_terms(&description, discount_days, discount_amount.as_deref())?;

        Ok(vec![PaymentTermEvent::Updated(PaymentTermUpdated {
            tenant_id: cmd.tenant_id,
            term_id: cmd.term_id,
            days,
            description,
            discount_days,
            discount_amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}
