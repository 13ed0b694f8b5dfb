//! Points ledger seam.
//!
//! Accepted proposals are applied by calling [`GrantLedger::grant`] exactly
//! once. The SQLite repository records grants in its `granted_points` table;
//! [`MemoryLedger`] keeps them in memory for tests.

use crate::chat::UserId;
use async_trait::async_trait;
use std::sync::Mutex;

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait GrantLedger: Send + Sync {
    async fn grant(&self, beneficiary: UserId, amount: u64) -> Result<(), LedgerError>;
}

/// In-memory ledger
#[derive(Default)]
pub struct MemoryLedger {
    grants: Mutex<Vec<(UserId, u64)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants applied so far, in order
    pub fn grants(&self) -> Vec<(UserId, u64)> {
        self.grants
            .lock()
            .map(|grants| grants.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GrantLedger for MemoryLedger {
    async fn grant(&self, beneficiary: UserId, amount: u64) -> Result<(), LedgerError> {
        self.grants
            .lock()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?
            .push((beneficiary, amount));
        Ok(())
    }
}
