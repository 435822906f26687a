//! `stockor-export`: which attributes API clients may read and write.
//!
//! Each model publishes a [`ModelSchema`]: its columns, attribute white and
//! black lists, exported associations and exported methods. Incoming JSON is
//! passed through [`ModelRegistry::sanitize_json`] before it reaches a command;
//! outgoing records go through [`ModelRegistry::export_json`].

pub mod error;
pub mod export;
pub mod registry;
pub mod sanitize;
pub mod schema;

pub use error::ExportError;
pub use registry::{Exportable, ModelRegistry};
pub use schema::{Association, AssociationKind, AttributeRule, ModelSchema};

/// Suffix clients use to write nested association records.
pub const NESTED_SUFFIX: &str = "_attributes";

#[cfg(test)]
pub(crate) mod fixtures;
