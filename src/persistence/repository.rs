//! Durable storage abstraction for proposals and voters.

use crate::chat::{MessageId, UserId};
use crate::grants::proposal::{Proposal, Voter};
use async_trait::async_trait;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    Missing(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Two related tables: proposals keyed by voting message, voters keyed by
/// (user, voting message) with cascade delete from their proposal.
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Insert a proposal row (voters are written separately)
    async fn insert_proposal(&self, proposal: &Proposal) -> RepositoryResult<()>;

    /// Delete a proposal; its voters go with it
    async fn delete_proposal(&self, voting_message_id: MessageId) -> RepositoryResult<()>;

    /// Record the seconds left on a proposal's countdown
    async fn update_timer(
        &self,
        voting_message_id: MessageId,
        remaining_secs: u64,
    ) -> RepositoryResult<()>;

    async fn insert_voter(&self, voter: &Voter) -> RepositoryResult<()>;

    async fn delete_voter(
        &self,
        user_id: UserId,
        voting_message_id: MessageId,
    ) -> RepositoryResult<()>;

    /// Every stored proposal with its voters
    async fn load_proposals(&self) -> RepositoryResult<Vec<Proposal>>;
}
