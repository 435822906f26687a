use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Opaque permission name such as `"sku_loc.write"`.
///
/// `"*"` grants everything within the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// `<model>.read`
    pub fn read(model: &str) -> Self {
        Self(Cow::Owned(format!("{model}.read")))
    }

    /// `<model>.write`
    pub fn write(model: &str) -> Self {
        Self(Cow::Owned(format!("{model}.write")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
