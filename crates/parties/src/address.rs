use serde::{Deserialize, Serialize};

use stockor_core::{DomainError, DomainResult, ValueObject};
use stockor_export::{Exportable, ModelSchema};

/// Postal address used for billing and shipping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl ValueObject for Address {}

impl Address {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("address name cannot be empty"));
        }
        if self.line1.trim().is_empty() {
            return Err(DomainError::validation("address line1 cannot be empty"));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation(format!("{email} is not a valid email")));
            }
        }
        Ok(())
    }
}

impl Exportable for Address {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("address").with_tracked_columns([
            "name",
            "email",
            "phone",
            "line1",
            "line2",
            "city",
            "state",
            "postal_code",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office() -> Address {
        Address {
            name: "Acme".into(),
            line1: "1 Main St".into(),
            city: "Springfield".into(),
            ..Address::default()
        }
    }

    #[test]
    fn name_and_first_line_are_required() {
        assert!(office().validate().is_ok());
        let mut a = office();
        a.line1.clear();
        assert!(a.validate().is_err());
    }

    #[test]
    fn email_must_look_like_one() {
        let mut a = office();
        a.email = Some("nobody".into());
        assert_eq!(
            a.validate().unwrap_err().message(),
            "nobody is not a valid email"
        );
    }
}
