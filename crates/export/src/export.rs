//! Outgoing JSON: keep only what the user may read.

use serde_json::{Map, Value};

use stockor_auth::ModelAccess;

use crate::{ExportError, ModelRegistry};

impl ModelRegistry {
    /// Filter a serialized record to the attributes, exported methods and
    /// exported associations `user` may read. Associated records are filtered
    /// against their own schema; `null` associations pass through.
    pub fn export_json(
        &self,
        model: &str,
        record: &Map<String, Value>,
        user: &dyn ModelAccess,
    ) -> Result<Map<String, Value>, ExportError> {
        let schema = self.get(model)?;
        if !user.can_read(model) {
            return Ok(Map::new());
        }

        let mut out = Map::new();
        for (key, value) in record {
            if schema.json_attribute_is_allowed(key, user) || schema.is_exported_method(key) {
                out.insert(key.clone(), value.clone());
                continue;
            }

            let Some(assoc) = schema.association(key).filter(|a| a.exported) else {
                continue;
            };
            if !user.can_read(&assoc.target) {
                continue;
            }

            let exported = match value {
                Value::Object(nested) => Some(Value::Object(self.export_json(&assoc.target, nested, user)?)),
                Value::Array(items) => Some(Value::Array(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|item| self.export_json(&assoc.target, item, user).map(Value::Object))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                Value::Null => Some(Value::Null),
                _ => None,
            };
            if let Some(exported) = exported {
                out.insert(key.clone(), exported);
            }
        }
        Ok(out)
    }

    /// Serialize any record and export it as a JSON value.
    pub fn export_record<T: serde::Serialize>(
        &self,
        model: &str,
        record: &T,
        user: &dyn ModelAccess,
    ) -> Result<Value, ExportError> {
        let value = serde_json::to_value(record).map_err(|_| ExportError::NotAnObject(model.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ExportError::NotAnObject(model.to_string()))?;
        Ok(Value::Object(self.export_json(model, obj, user)?))
    }
}
