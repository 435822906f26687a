//! Runtime settings for the API binary.
//!
//! Read from the process environment after `.env` has been loaded. Domain
//! options (table prefix, default codes) live in
//! [`stockor_core::Configuration`] instead.

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("PORT must be a number between 1 and 65535, got '{0}'")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub jwt_secret: String,
    pub port: u16,
    /// Postgres URL; migrations run at startup when set.
    pub database_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });

        let port = match lookup("PORT") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(SettingsError::InvalidPort(raw)),
            },
            None => DEFAULT_PORT,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            jwt_secret,
            port,
            database_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.jwt_secret, "dev-secret");
        assert_eq!(settings.database_url, None);
    }

    #[test]
    fn reads_every_setting() {
        let settings = Settings::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/stockor"),
        ]))
        .unwrap();
        assert_eq!(settings.jwt_secret, "s3cret");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.database_url.as_deref(), Some("postgres://localhost/stockor"));
    }

    #[test]
    fn rejects_bad_port() {
        let err = Settings::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert_eq!(err, SettingsError::InvalidPort("http".into()));
        assert!(Settings::from_lookup(lookup(&[("PORT", "0")])).is_err());
    }
}
