//! Test schemas and users.

use stockor_auth::{ModelAccess, Permission};

use crate::{ModelRegistry, ModelSchema};

/// Reads and writes every model; holds no extra permissions.
pub struct Everyone;

impl Everyone {
    pub fn with(perms: &[&str]) -> Granted {
        Granted {
            perms: perms.iter().map(|p| p.to_string()).collect(),
            read_only: Vec::new(),
        }
    }
}

impl ModelAccess for Everyone {
    fn can_read(&self, _model: &str) -> bool {
        true
    }
    fn can_write(&self, _model: &str) -> bool {
        true
    }
    fn has_permission(&self, _permission: &Permission) -> bool {
        false
    }
}

pub struct Granted {
    perms: Vec<String>,
    read_only: Vec<String>,
}

impl Granted {
    /// Same user, but unable to write (or read) `model`.
    pub fn without(mut self, model: &str) -> Self {
        self.read_only.push(model.to_string());
        self
    }
}

impl ModelAccess for Granted {
    fn can_read(&self, model: &str) -> bool {
        !self.read_only.iter().any(|m| m == model)
    }
    fn can_write(&self, model: &str) -> bool {
        !self.read_only.iter().any(|m| m == model)
    }
    fn has_permission(&self, permission: &Permission) -> bool {
        self.perms.iter().any(|p| p == permission.as_str())
    }
}

pub fn gl_account() -> ModelSchema {
    ModelSchema::new("gl_account")
        .with_tracked_columns(["name", "number", "description"])
        .has_many("credits", "gl_posting")
        .has_many("debits", "gl_posting")
}

pub fn gl_registry() -> ModelRegistry {
    let mut reg = ModelRegistry::new();
    reg.register(gl_account())
        .register(
            ModelSchema::new("gl_posting")
                .with_tracked_columns(["account_number", "amount", "gl_transaction_id"]),
        )
        .register(
            ModelSchema::new("gl_transaction")
                .with_tracked_columns(["description", "source_id", "source_type"])
                .has_many_writable("credits", "gl_posting")
                .has_many_writable("debits", "gl_posting"),
        )
        .register(
            ModelSchema::new("gl_manual_entry")
                .with_tracked_columns(["notes", "visible_id"])
                .has_one_writable("gl_transaction", "gl_transaction"),
        );
    reg
}
