use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockor_core::{
    Aggregate, AggregateRoot, Configuration, DomainError, Entity, Modifications, TenantId, UserId,
    code,
};
use stockor_events::Event;
use stockor_export::ModelSchema;

use crate::address::Address;

stockor_core::model_id!(BusinessEntityId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Vendor,
}

impl EntityKind {
    pub fn model_name(self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Vendor => "vendor",
        }
    }
}

/// Payment terms as seen by an entity: the code it references and the
/// description it exports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Terms {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// GL accounts an entity posts to by default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlDefaults {
    pub receivables: Option<String>,
    pub payables: Option<String>,
    pub freight: Option<String>,
}

impl GlDefaults {
    /// Customers post to receivables; vendors to payables and freight.
    pub fn for_kind(kind: EntityKind, config: &Configuration) -> Self {
        let accounts = config.default_gl_accounts();
        match kind {
            EntityKind::Customer => Self {
                receivables: Some(accounts.ar.clone()),
                ..Self::default()
            },
            EntityKind::Vendor => Self {
                payables: Some(accounts.ap.clone()),
                freight: Some(accounts.freight.clone()),
                ..Self::default()
            },
        }
    }
}

/// Aggregate root: a customer or a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessEntity {
    id: BusinessEntityId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    kind: EntityKind,
    code: String,
    hash_code: String,
    name: String,
    billing_address: Address,
    shipping_address: Address,
    #[serde(skip)]
    terms: Terms,
    gl_defaults: GlDefaults,
    #[serde(flatten)]
    modifications: Option<Modifications>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl BusinessEntity {
    pub fn empty(id: BusinessEntityId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: EntityKind::Customer,
            code: String::new(),
            hash_code: String::new(),
            name: String::new(),
            billing_address: Address::default(),
            shipping_address: Address::default(),
            terms: Terms::default(),
            gl_defaults: GlDefaults::default(),
            modifications: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BusinessEntityId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn hash_code(&self) -> &str {
        &self.hash_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn terms_code(&self) -> &str {
        &self.terms.code
    }

    pub fn terms_description(&self) -> Option<&str> {
        self.terms.description.as_deref()
    }

    pub fn gl_defaults(&self) -> &GlDefaults {
        &self.gl_defaults
    }

    pub fn modifications(&self) -> Option<&Modifications> {
        self.modifications.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for BusinessEntity {
    type Id = BusinessEntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Entity for BusinessEntity {
    type Id = BusinessEntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn model_name() -> &'static str {
        "business_entity"
    }
}

/// Export schema for one kind of entity. Customers and vendors share the
/// columns but are permissioned separately.
pub fn export_schema(kind: EntityKind) -> ModelSchema {
    let schema = ModelSchema::new(kind.model_name())
        .with_tracked_columns(["code", "hash_code", "name"])
        .belongs_to_writable("billing_address", "address")
        .belongs_to_writable("shipping_address", "address")
        .belongs_to_writable("terms", "payment_term")
        .export_methods(["terms_code", "terms_description"]);
    match kind {
        EntityKind::Customer => schema.with_columns(["gl_receivables_account"]),
        EntityKind::Vendor => schema.with_columns(["gl_payables_account", "gl_freight_account"]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBusinessEntity {
    pub tenant_id: TenantId,
    pub entity_id: BusinessEntityId,
    pub kind: EntityKind,
    /// Derived from `name` when absent.
    pub code: Option<String>,
    pub name: String,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    /// Defaults to the configured customer or vendor terms.
    pub terms: Option<Terms>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBusinessEntity {
    pub tenant_id: TenantId,
    pub entity_id: BusinessEntityId,
    pub name: Option<String>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub terms: Option<Terms>,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessEntityCommand {
    Register(RegisterBusinessEntity),
    UpdateDetails(UpdateBusinessEntity),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessEntityRegistered {
    pub tenant_id: TenantId,
    pub entity_id: BusinessEntityId,
    pub kind: EntityKind,
    pub code: String,
    pub hash_code: String,
    pub name: String,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub terms: Terms,
    pub gl_defaults: GlDefaults,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessEntityUpdated {
    pub tenant_id: TenantId,
    pub entity_id: BusinessEntityId,
    pub name: String,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub terms: Terms,
    pub by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessEntityEvent {
    Registered(BusinessEntityRegistered),
    Updated(BusinessEntityUpdated),
}

impl Event for BusinessEntityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BusinessEntityEvent::Registered(_) => "parties.business_entity.registered",
            BusinessEntityEvent::Updated(_) => "parties.business_entity.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BusinessEntityEvent::Registered(e) => e.occurred_at,
            BusinessEntityEvent::Updated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BusinessEntity {
    type Command = BusinessEntityCommand;
    type Event = BusinessEntityEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BusinessEntityEvent::Registered(e) => {
                self.id = e.entity_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.code = e.code.clone();
                self.hash_code = e.hash_code.clone();
                self.name = e.name.clone();
                self.billing_address = e.billing_address.clone();
                self.shipping_address = e.shipping_address.clone();
                self.terms = e.terms.clone();
                self.gl_defaults = e.gl_defaults.clone();
                self.modifications = Some(Modifications::created(e.by, e.occurred_at));
                self.created = true;
            }
            BusinessEntityEvent::Updated(e) => {
                self.name = e.name.clone();
                self.billing_address = e.billing_address.clone();
                self.shipping_address = e.shipping_address.clone();
                self.terms = e.terms.clone();
                if let Some(m) = self.modifications.as_mut() {
                    m.touch(e.by, e.occurred_at);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BusinessEntityCommand::Register(cmd) => self.handle_register(cmd),
            BusinessEntityCommand::UpdateDetails(cmd) => self.handle_update(cmd),
        }
    }
}

fn required_address(address: Option<&Address>, which: &str) -> Result<Address, DomainError> {
    let address = address.ok_or_else(|| DomainError::validation(format!("{which} must be set")))?;
    address.validate()?;
    Ok(address.clone())
}

fn validate_terms(terms: &Terms) -> Result<(), DomainError> {
    if code::normalize(&terms.code).is_empty() {
        return Err(DomainError::validation("terms must be set"));
    }
    Ok(())
}

impl BusinessEntity {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterBusinessEntity,
    ) -> Result<Vec<BusinessEntityEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "{} already exists",
                self.kind.model_name()
            )));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let config = Configuration::global();
        let code = match &cmd.code {
            Some(c) => code::normalize(c),
            None => code::from_name(&cmd.name, code::DEFAULT_CODE_LENGTH),
        };
        if code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        let terms = cmd.terms.clone().unwrap_or_else(|| Terms {
            code: match cmd.kind {
                EntityKind::Customer => config.customer_terms_code().to_string(),
                EntityKind::Vendor => config.vendor_terms_code().to_string(),
            },
            description: None,
        });
        validate_terms(&terms)?;
        let billing_address = required_address(cmd.billing_address.as_ref(), "billing_address")?;
        let shipping_address = required_address(cmd.shipping_address.as_ref(), "shipping_address")?;

        Ok(vec![BusinessEntityEvent::Registered(BusinessEntityRegistered {
            tenant_id: cmd.tenant_id,
            entity_id: cmd.entity_id,
            kind: cmd.kind,
            code,
            hash_code: code::random_hash_code(),
            name: cmd.name.trim().to_string(),
            billing_address,
            shipping_address,
            terms: Terms {
                code: code::normalize(&terms.code),
                description: terms.description,
            },
            gl_defaults: GlDefaults::for_kind(cmd.kind, &config),
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateBusinessEntity,
    ) -> Result<Vec<BusinessEntityEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if cmd.entity_id != self.id {
            return Err(DomainError::invariant("entity_id mismatch"));
        }

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let billing_address = match &cmd.billing_address {
            Some(a) => required_address(Some(a), "billing_address")?,
            None => self.billing_address.clone(),
        };
        let shipping_address = match &cmd.shipping_address {
            Some(a) => required_address(Some(a), "shipping_address")?,
            None => self.shipping_address.clone(),
        };
        let terms = cmd.terms.clone().unwrap_or_else(|| self.terms.clone());
        validate_terms(&terms)?;

        Ok(vec![BusinessEntityEvent::Updated(BusinessEntityUpdated {
            tenant_id: cmd.tenant_id,
            entity_id: cmd.entity_id,
            name: name.trim().to_string(),
            billing_address,
            shipping_address,
            terms,
            by: cmd.by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockor_events::execute;

    fn address(name: &str) -> Address {
        Address {
            name: name.into(),
            line1: "12 Dock Rd".into(),
            city: "Portland".into(),
            ..Address::default()
        }
    }

    fn register(kind: EntityKind, id: BusinessEntityId) -> RegisterBusinessEntity {
        RegisterBusinessEntity {
            tenant_id: TenantId::new(),
            entity_id: id,
            kind,
            code: None,
            name: "Acme Tools, Inc.".into(),
            billing_address: Some(address("billing")),
            shipping_address: Some(address("shipping")),
            terms: None,
            by: UserId::new(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn code_is_derived_from_name() {
        let id = BusinessEntityId::generate();
        let mut e = BusinessEntity::empty(id);
        execute(&mut e, &BusinessEntityCommand::Register(register(EntityKind::Customer, id))).unwrap();

        assert_eq!(e.code(), "ACMETOOLSI");
        assert_eq!(e.hash_code().len(), 12);
        assert!(e.modifications().is_some());
    }

    #[test]
    fn customers_default_to_customer_terms_and_receivables() {
        let id = BusinessEntityId::generate();
        let mut e = BusinessEntity::empty(id);
        execute(&mut e, &BusinessEntityCommand::Register(register(EntityKind::Customer, id))).unwrap();

        assert_eq!(e.terms_code(), "CASH");
        assert_eq!(e.gl_defaults().receivables.as_deref(), Some("1200"));
        assert_eq!(e.gl_defaults().payables, None);
    }

    #[test]
    fn vendors_default_payables_and_freight() {
        let id = BusinessEntityId::generate();
        let mut e = BusinessEntity::empty(id);
        execute(&mut e, &BusinessEntityCommand::Register(register(EntityKind::Vendor, id))).unwrap();

        assert_eq!(e.gl_defaults().payables.as_deref(), Some("2200"));
        assert_eq!(e.gl_defaults().freight.as_deref(), Some("6420"));
    }

    #[test]
    fn addresses_are_required() {
        let id = BusinessEntityId::generate();
        let e = BusinessEntity::empty(id);
        let mut cmd = register(EntityKind::Customer, id);
        cmd.shipping_address = None;

        let err = e.handle(&BusinessEntityCommand::Register(cmd)).unwrap_err();
        assert_eq!(err.message(), "shipping_address must be set");
    }

    #[test]
    fn update_changes_terms_and_touches_modifications() {
        let id = BusinessEntityId::generate();
        let mut e = BusinessEntity::empty(id);
        let reg = register(EntityKind::Customer, id);
        let tenant_id = reg.tenant_id;
        execute(&mut e, &BusinessEntityCommand::Register(reg)).unwrap();

        let editor = UserId::new();
        let update = UpdateBusinessEntity {
            tenant_id,
            entity_id: id,
            name: None,
            billing_address: None,
            shipping_address: None,
            terms: Some(Terms {
                code: "NET30".into(),
                description: Some("Net 30".into()),
            }),
            by: editor,
            occurred_at: Utc::now(),
        };
        execute(&mut e, &BusinessEntityCommand::UpdateDetails(update)).unwrap();

        assert_eq!(e.terms_code(), "NET30");
        assert_eq!(e.terms_description(), Some("Net 30"));
        assert_eq!(e.modifications().and_then(|m| m.updated_by_id), Some(editor));
        assert_eq!(e.version(), 2);
    }

    #[test]
    fn export_schemas_differ_by_kind() {
        let customer = export_schema(EntityKind::Customer);
        let vendor = export_schema(EntityKind::Vendor);
        assert_eq!(customer.name(), "customer");
        assert!(customer.is_column("gl_receivables_account"));
        assert!(vendor.is_column("gl_freight_account"));
        assert!(vendor.is_exported_method("terms_description"));
    }
}
