//! In-memory GrantRepository for tests.
//!
//! Holds the same two-table shape as SQLite and can be switched into a mode
//! where every write fails, to exercise rollback paths.

use super::repository::{GrantRepository, RepositoryError, RepositoryResult};
use crate::chat::{MessageId, UserId};
use crate::grants::proposal::{Proposal, Voter};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryGrantRepository {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct Tables {
    proposals: BTreeMap<MessageId, Proposal>,
    voters: BTreeMap<(MessageId, UserId), Voter>,
}

impl MemoryGrantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored proposals
    pub fn proposal_count(&self) -> usize {
        self.tables().map(|t| t.proposals.len()).unwrap_or(0)
    }

    /// Number of stored voter rows across all proposals
    pub fn voter_count(&self) -> usize {
        self.tables().map(|t| t.voters.len()).unwrap_or(0)
    }

    fn tables(&self) -> RepositoryResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))
    }

    fn writable(&self) -> RepositoryResult<MutexGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "writes disabled".to_string(),
            ));
        }
        self.tables()
    }
}

#[async_trait]
impl GrantRepository for MemoryGrantRepository {
    async fn insert_proposal(&self, proposal: &Proposal) -> RepositoryResult<()> {
        let mut tables = self.writable()?;
        if tables.proposals.contains_key(&proposal.voting_message_id) {
            return Err(RepositoryError::Duplicate(format!(
                "proposal {}",
                proposal.voting_message_id
            )));
        }
        let mut row = proposal.clone();
        row.voters.clear();
        tables.proposals.insert(row.voting_message_id, row);
        Ok(())
    }

    async fn delete_proposal(&self, voting_message_id: MessageId) -> RepositoryResult<()> {
        let mut tables = self.writable()?;
        if tables.proposals.remove(&voting_message_id).is_none() {
            return Err(RepositoryError::Missing(format!(
                "proposal {}",
                voting_message_id
            )));
        }
        tables
            .voters
            .retain(|(proposal, _), _| *proposal != voting_message_id);
        Ok(())
    }

    async fn update_timer(
        &self,
        voting_message_id: MessageId,
        remaining_secs: u64,
    ) -> RepositoryResult<()> {
        let mut tables = self.writable()?;
        let row = tables
            .proposals
            .get_mut(&voting_message_id)
            .ok_or_else(|| RepositoryError::Missing(format!("proposal {}", voting_message_id)))?;
        row.timer_secs = remaining_secs;
        Ok(())
    }

    async fn insert_voter(&self, voter: &Voter) -> RepositoryResult<()> {
        let mut tables = self.writable()?;
        if !tables.proposals.contains_key(&voter.voting_message_id) {
            return Err(RepositoryError::Missing(format!(
                "proposal {}",
                voter.voting_message_id
            )));
        }
        let key = (voter.voting_message_id, voter.user_id);
        if tables.voters.contains_key(&key) {
            return Err(RepositoryError::Duplicate(format!(
                "voter {} on {}",
                voter.user_id, voter.voting_message_id
            )));
        }
        tables.voters.insert(key, voter.clone());
        Ok(())
    }

    async fn delete_voter(
        &self,
        user_id: UserId,
        voting_message_id: MessageId,
    ) -> RepositoryResult<()> {
        let mut tables = self.writable()?;
        tables
            .voters
            .remove(&(voting_message_id, user_id))
            .map(|_| ())
            .ok_or_else(|| {
                RepositoryError::Missing(format!("voter {} on {}", user_id, voting_message_id))
            })
    }

    async fn load_proposals(&self) -> RepositoryResult<Vec<Proposal>> {
        let tables = self.tables()?;
        Ok(tables
            .proposals
            .values()
            .map(|row| {
                let id = row.voting_message_id;
                let mut proposal = row.clone();
                proposal.voters = tables
                    .voters
                    .range((id, UserId(0))..=(id, UserId(u64::MAX)))
                    .map(|(_, voter)| voter.clone())
                    .collect();
                proposal
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::proposal::fixtures::proposal;

    #[tokio::test]
    async fn test_delete_cascades_to_voters() {
        let repo = MemoryGrantRepository::new();
        repo.insert_proposal(&proposal(10)).await.unwrap();
        repo.insert_proposal(&proposal(20)).await.unwrap();
        repo.insert_voter(&Voter::new(UserId(5), MessageId(10)))
            .await
            .unwrap();
        repo.insert_voter(&Voter::new(UserId(5), MessageId(20)))
            .await
            .unwrap();

        repo.delete_proposal(MessageId(10)).await.unwrap();

        assert_eq!(repo.proposal_count(), 1);
        assert_eq!(repo.voter_count(), 1);
        let loaded = repo.load_proposals().await.unwrap();
        assert_eq!(loaded[0].voters.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let repo = MemoryGrantRepository::new();
        repo.set_fail_writes(true);

        let result = repo.insert_proposal(&proposal(10)).await;
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
        assert_eq!(repo.proposal_count(), 0);

        repo.set_fail_writes(false);
        repo.insert_proposal(&proposal(10)).await.unwrap();
        assert_eq!(repo.proposal_count(), 1);
    }
}
