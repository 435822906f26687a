//! `stockor-core`: domain foundation building blocks shared by every Stockor crate.
//!
//! Pure domain primitives only: identifiers, the error model, aggregate traits,
//! and the small record-keeping helpers (locked fields, modification stamps,
//! code identifiers) that every model reuses. The process-wide configuration
//! also lives here because domain defaults read from it.

pub mod aggregate;
pub mod code;
pub mod config;
pub mod entity;
pub mod error;
pub mod id;
pub mod locked;
pub mod modifications;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use config::{Configuration, DefaultGlAccounts};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use locked::LockedFields;
pub use modifications::Modifications;
pub use value_object::ValueObject;
