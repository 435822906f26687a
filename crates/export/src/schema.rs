//! Per-model attribute access rules.

use std::collections::{BTreeMap, BTreeSet};

use stockor_auth::{ModelAccess, Permission};

/// Tracking columns every model hides unless explicitly whitelisted.
pub const DEFAULT_BLACKLIST: &[&str] = &["created_at", "updated_at", "created_by_id", "updated_by_id"];

/// When a white/black list entry takes effect for a given user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRule {
    Always,
    /// Only for users holding the permission.
    IfPermitted(Permission),
    /// Only for users lacking the permission.
    UnlessPermitted(Permission),
}

impl AttributeRule {
    pub fn applies_to(&self, user: &dyn ModelAccess) -> bool {
        match self {
            AttributeRule::Always => true,
            AttributeRule::IfPermitted(p) => user.has_permission(p),
            AttributeRule::UnlessPermitted(p) => !user.has_permission(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub kind: AssociationKind,
    /// Schema name of the associated model.
    pub target: String,
    /// Included in exported JSON.
    pub exported: bool,
    /// Accepted as `<name>_attributes` in incoming JSON.
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    name: String,
    columns: BTreeSet<String>,
    whitelisted: BTreeMap<String, AttributeRule>,
    blacklisted: BTreeMap<String, AttributeRule>,
    associations: BTreeMap<String, Association>,
    exported_methods: BTreeSet<String>,
}

impl ModelSchema {
    /// Empty schema with the tracking columns blacklisted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: BTreeSet::new(),
            whitelisted: BTreeMap::new(),
            blacklisted: DEFAULT_BLACKLIST
                .iter()
                .map(|c| (c.to_string(), AttributeRule::Always))
                .collect(),
            associations: BTreeMap::new(),
            exported_methods: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Columns plus the `id`, `created_*` and `updated_*` columns.
    pub fn with_tracked_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_columns(["id"])
            .with_columns(DEFAULT_BLACKLIST.iter().copied())
            .with_columns(columns)
    }

    pub fn belongs_to(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::BelongsTo, target, true, false)
    }

    pub fn belongs_to_writable(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::BelongsTo, target, true, true)
    }

    pub fn has_one_writable(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::HasOne, target, true, true)
    }

    pub fn has_many(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::HasMany, target, true, false)
    }

    pub fn has_many_writable(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::HasMany, target, true, true)
    }

    /// Association known to the model but never exported (e.g. `so_lines` on a sku-loc).
    pub fn has_many_private(self, name: &str, target: &str) -> Self {
        self.associate(name, AssociationKind::HasMany, target, false, false)
    }

    fn associate(
        mut self,
        name: &str,
        kind: AssociationKind,
        target: &str,
        exported: bool,
        writable: bool,
    ) -> Self {
        self.associations.insert(
            name.to_string(),
            Association {
                kind,
                target: target.to_string(),
                exported,
                writable,
            },
        );
        self
    }

    /// Derived or delegated read-only values (`qty_available`, `location_code`).
    pub fn export_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exported_methods.extend(methods.into_iter().map(Into::into));
        self
    }

    pub fn blacklist(mut self, names: &[&str]) -> Self {
        self.blacklist_json_attributes(names.iter().copied(), AttributeRule::Always);
        self
    }

    pub fn whitelist(mut self, names: &[&str]) -> Self {
        self.whitelist_json_attributes(names.iter().copied(), AttributeRule::Always);
        self
    }

    /// Hide attributes. A whitelist entry for the same attribute is removed.
    pub fn blacklist_json_attributes<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
        rule: AttributeRule,
    ) {
        for name in names {
            self.whitelisted.remove(name);
            self.blacklisted.insert(name.to_string(), rule.clone());
        }
    }

    /// Expose attributes, even ones that aren't columns. Clears a blacklist entry.
    pub fn whitelist_json_attributes<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
        rule: AttributeRule,
    ) {
        for name in names {
            self.blacklisted.remove(name);
            self.whitelisted.insert(name.to_string(), rule.clone());
        }
    }

    /// Drop every white/black list entry, including the default blacklist.
    pub fn clear_attribute_rules(&mut self) {
        self.whitelisted.clear();
        self.blacklisted.clear();
    }

    /// Change the export/write flags of an existing association.
    pub fn export_associations<'a>(&mut self, names: impl IntoIterator<Item = &'a str>, writable: bool) {
        for name in names {
            match self.associations.get_mut(name) {
                Some(assoc) => {
                    assoc.exported = true;
                    assoc.writable = writable;
                }
                None => tracing::warn!(model = %self.name, association = name, "no such association to export"),
            }
        }
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> impl Iterator<Item = (&str, &Association)> {
        self.associations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn is_exported_method(&self, name: &str) -> bool {
        self.exported_methods.contains(name)
    }

    /// May `user` read/write this attribute through JSON?
    ///
    /// Whitelisted for the user wins; otherwise the attribute must be a column
    /// that isn't blacklisted for the user.
    pub fn json_attribute_is_allowed(&self, name: &str, user: &dyn ModelAccess) -> bool {
        if self
            .whitelisted
            .get(name)
            .is_some_and(|rule| rule.applies_to(user))
        {
            return true;
        }
        self.columns.contains(name)
            && !self
                .blacklisted
                .get(name)
                .is_some_and(|rule| rule.applies_to(user))
    }

    /// Is `name` an association the user may write nested records through?
    pub fn has_exported_nested_attribute(&self, name: &str, user: &dyn ModelAccess) -> bool {
        self.associations
            .get(name)
            .is_some_and(|a| a.exported && a.writable && user.can_write(&a.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Everyone, gl_account};

    #[test]
    fn columns_are_allowed() {
        let schema = gl_account();
        assert!(schema.json_attribute_is_allowed("name", &Everyone));
        assert!(!schema.json_attribute_is_allowed("drop_table", &Everyone));
    }

    #[test]
    fn blacklisting_hides_a_column() {
        let mut schema = gl_account();
        schema.blacklist_json_attributes(["name"], AttributeRule::Always);
        assert!(!schema.json_attribute_is_allowed("name", &Everyone));
    }

    #[test]
    fn tracking_columns_are_hidden_until_whitelisted() {
        let mut schema = gl_account();
        assert!(!schema.json_attribute_is_allowed("updated_at", &Everyone));
        schema.whitelist_json_attributes(["updated_at"], AttributeRule::Always);
        assert!(schema.json_attribute_is_allowed("updated_at", &Everyone));
    }

    #[test]
    fn conditional_rules_follow_permissions() {
        let mut schema = gl_account();
        let audit = Permission::new("audit.read");
        schema.whitelist_json_attributes(["created_by_id"], AttributeRule::IfPermitted(audit.clone()));
        schema.blacklist_json_attributes(["number"], AttributeRule::UnlessPermitted(audit));

        let auditor = Everyone::with(&["audit.read"]);
        assert!(schema.json_attribute_is_allowed("created_by_id", &auditor));
        assert!(schema.json_attribute_is_allowed("number", &auditor));
        assert!(!schema.json_attribute_is_allowed("created_by_id", &Everyone));
        assert!(!schema.json_attribute_is_allowed("number", &Everyone));
    }

    #[test]
    fn read_only_association_is_not_nested_writable() {
        let schema = gl_account();
        assert!(!schema.has_exported_nested_attribute("credits", &Everyone));
    }
}
