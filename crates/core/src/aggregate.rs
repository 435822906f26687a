//! Aggregate traits for Stockor's event-sourced models.
//!
//! Sku-locs, sales orders, payment terms and business entities all follow the
//! same shape: a command is checked against current state and turned into
//! events, and state only ever changes by applying those events.

use crate::error::{DomainError, DomainResult};

/// Identity + stream version of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation checked when appending to a stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "stale record (expected: {self:?}, actual: {actual})"
        )))
    }
}

/// Decide/evolve contract.
///
/// `handle` must not mutate; `apply` must be deterministic and bump the
/// version by one per event.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
