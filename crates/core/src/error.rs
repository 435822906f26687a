//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failures: validation, invariants, conflicts.
///
/// Storage and transport failures have their own error types in `stockor-infra`
/// and the API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation. The message is user facing
    /// (e.g. "Location AMAZON does not have skus STRING").
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Duplicate record or stale version.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// The bare message without the variant prefix, as shown to API clients.
    pub fn message(&self) -> String {
        match self {
            DomainError::Validation(m)
            | DomainError::InvariantViolation(m)
            | DomainError::InvalidId(m)
            | DomainError::Conflict(m) => m.clone(),
            DomainError::NotFound => "not found".to_string(),
            DomainError::Unauthorized => "unauthorized".to_string(),
        }
    }
}
