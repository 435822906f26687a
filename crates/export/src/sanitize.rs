//! Incoming JSON: keep only what the user may write.

use serde_json::{Map, Value};

use stockor_auth::ModelAccess;

use crate::{ExportError, ModelRegistry, NESTED_SUFFIX};

impl ModelRegistry {
    /// Filter a JSON object down to the attributes `user` may write on `model`.
    ///
    /// * nothing at all unless the user can write the model;
    /// * allowed attributes are copied as-is;
    /// * `foo` / `foo_attributes` naming an exported, writable association is
    ///   sanitized against the associated model and stored as `foo_attributes`:
    ///   objects stay objects (dropped when nothing survives), arrays are
    ///   sanitized element-wise and always kept, any other value is dropped;
    /// * every other key is dropped.
    pub fn sanitize_json(
        &self,
        model: &str,
        json: &Map<String, Value>,
        user: &dyn ModelAccess,
    ) -> Result<Map<String, Value>, ExportError> {
        let schema = self.get(model)?;
        if !user.can_write(model) {
            tracing::debug!(model, "user cannot write model; discarding payload");
            return Ok(Map::new());
        }

        let mut result = Map::new();
        for (key, value) in json {
            if schema.json_attribute_is_allowed(key, user) {
                result.insert(key.clone(), value.clone());
                continue;
            }

            let name = key.strip_suffix(NESTED_SUFFIX).unwrap_or(key);
            let Some(assoc) = schema
                .association(name)
                .filter(|_| schema.has_exported_nested_attribute(name, user))
            else {
                tracing::trace!(model, attribute = %key, "dropping attribute");
                continue;
            };

            let cleaned = match value {
                Value::Object(nested) => {
                    let nested = self.sanitize_json(&assoc.target, nested, user)?;
                    (!nested.is_empty()).then_some(Value::Object(nested))
                }
                Value::Array(items) => {
                    let nested = items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|item| self.sanitize_json(&assoc.target, item, user).map(Value::Object))
                        .collect::<Result<Vec<_>, _>>()?;
                    Some(Value::Array(nested))
                }
                _ => None,
            };

            if let Some(cleaned) = cleaned {
                result.insert(format!("{name}{NESTED_SUFFIX}"), cleaned);
            }
        }

        Ok(result)
    }

    /// [`sanitize_json`](Self::sanitize_json) for an arbitrary JSON value; the
    /// value must be an object.
    pub fn sanitize_value(
        &self,
        model: &str,
        json: &Value,
        user: &dyn ModelAccess,
    ) -> Result<Map<String, Value>, ExportError> {
        let obj = json
            .as_object()
            .ok_or_else(|| ExportError::NotAnObject(model.to_string()))?;
        self.sanitize_json(model, obj, user)
    }
}
