//! created/updated stamps carried by every tracked record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifications {
    pub created_at: DateTime<Utc>,
    pub created_by_id: UserId,
    /// `None` for create-only records (e.g. GL postings).
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by_id: Option<UserId>,
}

impl Modifications {
    pub fn created(by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            created_by_id: by,
            updated_at: Some(at),
            updated_by_id: Some(by),
        }
    }

    pub fn create_only(by: UserId, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            created_by_id: by,
            updated_at: None,
            updated_by_id: None,
        }
    }

    pub fn touch(&mut self, by: UserId, at: DateTime<Utc>) {
        self.updated_at = Some(at);
        self.updated_by_id = Some(by);
    }

    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn touch_moves_updated_stamp_only() {
        let creator = UserId::new();
        let editor = UserId::new();
        let t0 = Utc::now();
        let mut m = Modifications::created(creator, t0);
        m.touch(editor, t0 + Duration::minutes(5));

        assert_eq!(m.created_by_id, creator);
        assert_eq!(m.created_at, t0);
        assert_eq!(m.updated_by_id, Some(editor));
        assert_eq!(m.last_changed_at(), t0 + Duration::minutes(5));
    }

    #[test]
    fn create_only_has_no_update_stamp() {
        let t0 = Utc::now();
        let m = Modifications::create_only(UserId::new(), t0);
        assert!(m.updated_at.is_none());
        assert_eq!(m.last_changed_at(), t0);
    }
}
