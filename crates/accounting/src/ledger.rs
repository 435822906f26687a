use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use stockor_events::Event;

use crate::gl::GlTransaction;

stockor_core::model_id!(
    /// Ledger identifier (one per tenant in practice).
    LedgerId
);

/// Aggregate root: Ledger.
///
/// The ledger holds no balances. It only guards tenant identity and checks
/// each transaction before it is recorded; balances come from projections
/// over `TransactionPosted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    tenant_id: Option<TenantId>,
    posted: u64,
    version: u64,
    created: bool,
}

impl Ledger {
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            posted: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Number of transactions recorded.
    pub fn posted_count(&self) -> u64 {
        self.posted
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransaction {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: uuid::Uuid,
    pub transaction: GlTransaction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    PostTransaction(PostTransaction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPosted {
    pub tenant_id: TenantId,
    pub ledger_id: LedgerId,
    pub entry_id: uuid::Uuid,
    pub transaction: GlTransaction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    TransactionPosted(TransactionPosted),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::TransactionPosted(_) => "accounting.ledger.transaction_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::TransactionPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::TransactionPosted(e) => {
                self.id = e.ledger_id;
                if self.tenant_id.is_none() {
                    self.tenant_id = Some(e.tenant_id);
                    self.created = true;
                }
                self.posted += 1;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::PostTransaction(cmd) => self.handle_post(cmd),
        }
    }
}

impl Ledger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_post(&self, cmd: &PostTransaction) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        cmd.transaction.validate()?;

        Ok(vec![LedgerEvent::TransactionPosted(TransactionPosted {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            transaction: cmd.transaction.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
