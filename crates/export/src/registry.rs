use std::collections::HashMap;

use crate::error::ExportError;
use crate::schema::ModelSchema;

/// Implemented by every model that can travel over the API.
pub trait Exportable {
    fn export_schema() -> ModelSchema;
}

/// All known model schemas, looked up by name when following associations.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    schemas: HashMap<String, ModelSchema>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a schema.
    pub fn register(&mut self, schema: ModelSchema) -> &mut Self {
        self.schemas.insert(schema.name().to_string(), schema);
        self
    }

    pub fn register_model<M: Exportable>(&mut self) -> &mut Self {
        self.register(M::export_schema())
    }

    pub fn get(&self, model: &str) -> Result<&ModelSchema, ExportError> {
        self.schemas
            .get(model)
            .ok_or_else(|| ExportError::UnknownModel(model.to_string()))
    }

    /// Mutable access, for adjusting white/black lists at runtime.
    pub fn get_mut(&mut self, model: &str) -> Result<&mut ModelSchema, ExportError> {
        self.schemas
            .get_mut(model)
            .ok_or_else(|| ExportError::UnknownModel(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.schemas.contains_key(model)
    }

    /// Every association must point at a registered model.
    pub fn check_associations(&self) -> Result<(), ExportError> {
        for schema in self.schemas.values() {
            for (name, assoc) in schema.associations() {
                if !self.schemas.contains_key(&assoc.target) {
                    return Err(ExportError::UnknownTarget {
                        model: schema.name().to_string(),
                        association: name.to_string(),
                        target: assoc.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::gl_registry;

    #[test]
    fn fixture_registry_is_consistent() {
        assert!(gl_registry().check_associations().is_ok());
    }

    #[test]
    fn dangling_association_is_reported() {
        let mut reg = ModelRegistry::new();
        reg.register(ModelSchema::new("invoice").has_many_writable("lines", "invoice_line"));
        let err = reg.check_associations().unwrap_err();
        assert_eq!(
            err,
            ExportError::UnknownTarget {
                model: "invoice".into(),
                association: "lines".into(),
                target: "invoice_line".into(),
            }
        );
    }

    #[test]
    fn unknown_model_lookup_fails() {
        assert_eq!(
            ModelRegistry::new().get("sku").unwrap_err(),
            ExportError::UnknownModel("sku".into())
        );
    }
}
