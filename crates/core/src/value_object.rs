//! Value object trait: equality by value, not identity.

/// Marker trait for value objects (addresses, GL postings, money amounts).
///
/// Two value objects holding the same values are the same value. They are
/// replaced rather than mutated.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
