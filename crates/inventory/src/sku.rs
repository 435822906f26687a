use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, Configuration, DomainError, TenantId, code};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};

stockor_core::model_id!(SkuId);

/// Aggregate root: a stock keeping unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sku {
    id: SkuId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    code: String,
    description: String,
    /// Eaches per default unit of measure.
    default_uom_size: i64,
    can_backorder: bool,
    gl_asset_account: String,
    does_track_inventory: bool,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Sku {
    pub fn empty(id: SkuId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            description: String::new(),
            default_uom_size: 1,
            can_backorder: false,
            gl_asset_account: String::new(),
            does_track_inventory: true,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SkuId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_uom_size(&self) -> i64 {
        self.default_uom_size
    }

    pub fn can_backorder(&self) -> bool {
        self.can_backorder
    }

    pub fn gl_asset_account(&self) -> &str {
        &self.gl_asset_account
    }

    pub fn does_track_inventory(&self) -> bool {
        self.does_track_inventory
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Sku {
    type Id = SkuId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Exportable for Sku {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("sku")
            .with_tracked_columns([
                "code",
                "description",
                "default_uom_size",
                "can_backorder",
                "gl_asset_account",
                "does_track_inventory",
            ])
            .has_many("sku_locs", "sku_loc")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSku {
    pub tenant_id: TenantId,
    pub sku_id: SkuId,
    pub code: String,
    pub description: String,
    pub default_uom_size: Option<i64>,
    /// Configured `skus_backorder_default` when absent.
    pub can_backorder: Option<bool>,
    /// Configured asset account when absent.
    pub gl_asset_account: Option<String>,
    pub does_track_inventory: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuCommand {
    Create(CreateSku),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuCreated {
    pub tenant_id: TenantId,
    pub sku_id: SkuId,
    pub code: String,
    pub description: String,
    pub default_uom_size: i64,
    pub can_backorder: bool,
    pub gl_asset_account: String,
    pub does_track_inventory: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuEvent {
    Created(SkuCreated),
}

impl Event for SkuEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SkuEvent::Created(_) => "inventory.sku.created",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SkuEvent::Created(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sku {
    type Command = SkuCommand;
    type Event = SkuEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SkuEvent::Created(e) => {
                self.id = e.sku_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.description = e.description.clone();
                self.default_uom_size = e.default_uom_size;
                self.can_backorder = e.can_backorder;
                self.gl_asset_account = e.gl_asset_account.clone();
                self.does_track_inventory = e.does_track_inventory;
                self.created = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SkuCommand::Create(cmd) => self.handle_create(cmd),
        }
    }
}

impl Sku {
    fn handle_create(&self, cmd: &CreateSku) -> Result<Vec<SkuEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sku already exists"));
        }
        let code = code::normalize(&cmd.code);
        if code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        let default_uom_size = cmd.default_uom_size.unwrap_or(1);
        if default_uom_size < 1 {
            return Err(DomainError::validation("default_uom_size must be at least 1"));
        }

        let config = Configuration::global();
        Ok(vec![SkuEvent::Created(SkuCreated {
            tenant_id: cmd.tenant_id,
            sku_id: cmd.sku_id,
            code,
            description: cmd.description.trim().to_string(),
            default_uom_size,
            can_backorder: cmd.can_backorder.unwrap_or(config.skus_backorder_default()),
            gl_asset_account: cmd
                .gl_asset_account
                .clone()
                .unwrap_or_else(|| config.default_gl_accounts().asset.clone()),
            does_track_inventory: cmd.does_track_inventory.unwrap_or(true),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockor_events::execute;

    fn create(id: SkuId) -> CreateSku {
        CreateSku {
            tenant_id: TenantId::new(),
            sku_id: id,
            code: "string".into(),
            description: "Ball of string".into(),
            default_uom_size: None,
            can_backorder: None,
            gl_asset_account: None,
            does_track_inventory: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn defaults_come_from_configuration() {
        let id = SkuId::generate();
        let mut sku = Sku::empty(id);
        execute(&mut sku, &SkuCommand::Create(create(id))).unwrap();

        assert_eq!(sku.code(), "STRING");
        assert!(sku.can_backorder());
        assert_eq!(sku.gl_asset_account(), "1100");
        assert_eq!(sku.default_uom_size(), 1);
    }

    #[test]
    fn uom_size_must_be_positive() {
        let id = SkuId::generate();
        let mut cmd = create(id);
        cmd.default_uom_size = Some(0);
        assert!(Sku::empty(id).handle(&SkuCommand::Create(cmd)).is_err());
    }
}
