//! General ledger records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_core::{DomainError, DomainResult, ValueObject};
use stockor_export::{Exportable, ModelSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlAccount {
    /// Four digit account number, e.g. `1200`.
    pub number: String,
    pub name: String,
    pub description: Option<String>,
}

impl GlAccount {
    /// Account number qualified by a location's branch code (`1200` + `01`).
    pub fn branch_number(&self, branch_code: &str) -> String {
        format!("{}{}", self.number, branch_code)
    }
}

impl Exportable for GlAccount {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("gl_account")
            .with_tracked_columns(["number", "name", "description"])
            .has_many("credits", "gl_posting")
            .has_many("debits", "gl_posting")
    }
}

/// One side of a transaction against a branch-qualified account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlPosting {
    pub account_number: String,
    /// Always positive; the side is given by which list holds the posting.
    pub amount: Decimal,
}

impl ValueObject for GlPosting {}

impl GlPosting {
    pub fn new(account_number: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_number: account_number.into(),
            amount,
        }
    }
}

impl Exportable for GlPosting {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("gl_posting").with_tracked_columns(["account_number", "amount", "gl_transaction_id"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlTransaction {
    /// What caused the transaction (`"invoice:<id>"`, `"manual"`). Never
    /// accepted from clients.
    pub source: Option<String>,
    pub description: String,
    pub credits: Vec<GlPosting>,
    pub debits: Vec<GlPosting>,
}

impl GlTransaction {
    pub fn credit_total(&self) -> Decimal {
        self.credits.iter().map(|p| p.amount).sum()
    }

    pub fn debit_total(&self) -> Decimal {
        self.debits.iter().map(|p| p.amount).sum()
    }

    /// Both sides present, every amount positive and credits == debits.
    pub fn validate(&self) -> DomainResult<()> {
        if self.credits.is_empty() || self.debits.is_empty() {
            return Err(DomainError::validation("transaction needs at least one credit and one debit"));
        }
        if let Some(p) = self
            .credits
            .iter()
            .chain(self.debits.iter())
            .find(|p| p.amount <= Decimal::ZERO)
        {
            return Err(DomainError::validation(format!(
                "posting to {} must have a positive amount",
                p.account_number
            )));
        }
        if self
            .credits
            .iter()
            .chain(self.debits.iter())
            .any(|p| p.account_number.trim().is_empty())
        {
            return Err(DomainError::validation("posting account_number cannot be empty"));
        }
        let (credits, debits) = (self.credit_total(), self.debit_total());
        if credits != debits {
            return Err(DomainError::validation(format!(
                "transaction is unbalanced (credits {credits}, debits {debits})"
            )));
        }
        Ok(())
    }
}

impl Exportable for GlTransaction {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("gl_transaction")
            .with_tracked_columns(["description", "source_id", "source_type", "period_id"])
            .has_many_writable("credits", "gl_posting")
            .has_many_writable("debits", "gl_posting")
    }
}

/// A transaction keyed in by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlManualEntry {
    pub notes: Option<String>,
    pub gl_transaction: GlTransaction,
}

impl Exportable for GlManualEntry {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("gl_manual_entry")
            .with_tracked_columns(["notes", "visible_id"])
            .has_one_writable("gl_transaction", "gl_transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced() -> GlTransaction {
        GlTransaction {
            source: None,
            description: "deposit".into(),
            credits: vec![GlPosting::new("120001", Decimal::new(1550, 2))],
            debits: vec![
                GlPosting::new("101001", Decimal::new(1000, 2)),
                GlPosting::new("101001", Decimal::new(550, 2)),
            ],
        }
    }

    #[test]
    fn balanced_transaction_is_valid() {
        let t = balanced();
        assert!(t.validate().is_ok());
        assert_eq!(t.credit_total(), t.debit_total());
    }

    #[test]
    fn unbalanced_transaction_is_rejected() {
        let mut t = balanced();
        t.debits.pop();
        let err = t.validate().unwrap_err();
        assert!(err.message().contains("unbalanced"));
    }

    #[test]
    fn one_sided_transaction_is_rejected() {
        let mut t = balanced();
        t.credits.clear();
        assert!(t.validate().is_err());
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut t = balanced();
        t.credits.push(GlPosting::new("400001", Decimal::ZERO));
        assert!(t.validate().unwrap_err().message().contains("positive"));
    }

    #[test]
    fn branch_numbers_append_the_branch_code() {
        let cash = GlAccount {
            number: "1200".into(),
            name: "Receivables".into(),
            description: None,
        };
        assert_eq!(cash.branch_number("01"), "120001");
    }
}
