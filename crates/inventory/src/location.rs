use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, Configuration, DomainError, TenantId, code};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};

stockor_core::model_id!(LocationId);

/// Aggregate root: a stocking location (warehouse, store, marketplace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    id: LocationId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    /// Suffix appended to GL account numbers for postings made here.
    gl_branch_code: String,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Location {
    pub fn empty(id: LocationId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            gl_branch_code: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LocationId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gl_branch_code(&self) -> &str {
        &self.gl_branch_code
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Exportable for Location {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("location")
            .with_tracked_columns(["code", "name", "gl_branch_code"])
            .has_many("sku_locs", "sku_loc")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLocation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub code: String,
    pub name: String,
    pub gl_branch_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationCommand {
    Create(CreateLocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCreated {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub code: String,
    pub name: String,
    pub gl_branch_code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationEvent {
    Created(LocationCreated),
}

impl Event for LocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LocationEvent::Created(_) => "inventory.location.created",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LocationEvent::Created(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Location {
    type Command = LocationCommand;
    type Event = LocationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LocationEvent::Created(e) => {
                self.id = e.location_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.gl_branch_code = e.gl_branch_code.clone();
                self.created = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LocationCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("location already exists"));
                }
                let code = code::normalize(&cmd.code);
                if code.is_empty() {
                    return Err(DomainError::validation("code cannot be empty"));
                }
                let name = if cmd.name.trim().is_empty() {
                    code.clone()
                } else {
                    cmd.name.trim().to_string()
                };
                let gl_branch_code = match &cmd.gl_branch_code {
                    Some(b) if !b.trim().is_empty() => b.trim().to_string(),
                    _ => Configuration::global().default_branch_code().to_string(),
                };
                Ok(vec![LocationEvent::Created(LocationCreated {
                    tenant_id: cmd.tenant_id,
                    location_id: cmd.location_id,
                    code,
                    name,
                    gl_branch_code,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
