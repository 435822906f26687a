//! Fields that may only change inside an explicit unlock.
//!
//! A sku-loc's `qty` and `mac` are locked: a generic attribute update must not
//! touch them, only the dedicated adjust/receive operations may, and those
//! name the fields they unlock.

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedFields {
    fields: &'static [&'static str],
}

impl LockedFields {
    pub const fn new(fields: &'static [&'static str]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    pub fn is_locked(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Fails unless `field` is either not locked or listed in `unlocked`.
    pub fn ensure_unlocked(&self, field: &str, unlocked: &[&str]) -> DomainResult<()> {
        if self.is_locked(field) && !unlocked.contains(&field) {
            return Err(DomainError::invariant(format!("{field} is locked")));
        }
        Ok(())
    }

    /// Checks every field a change touches.
    pub fn ensure_all_unlocked<'a>(
        &self,
        changed: impl IntoIterator<Item = &'a str>,
        unlocked: &[&str],
    ) -> DomainResult<()> {
        changed
            .into_iter()
            .try_for_each(|field| self.ensure_unlocked(field, unlocked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKS: LockedFields = LockedFields::new(&["qty", "mac"]);

    #[test]
    fn locked_field_requires_unlock() {
        let err = LOCKS.ensure_unlocked("qty", &[]).unwrap_err();
        assert_eq!(err, DomainError::invariant("qty is locked"));
        assert!(LOCKS.ensure_unlocked("qty", &["qty"]).is_ok());
    }

    #[test]
    fn unlocked_fields_pass() {
        assert!(LOCKS.ensure_unlocked("bin", &[]).is_ok());
        assert!(LOCKS.ensure_all_unlocked(["bin", "mac"], &["mac"]).is_ok());
        assert!(LOCKS.ensure_all_unlocked(["bin", "mac"], &["qty"]).is_err());
    }
}
