//! Proposal Store.
//!
//! In-memory index of active proposals keyed by voting message id,
//! write-through over a [`GrantRepository`]. Durable writes complete before
//! the index changes, so a failed write leaves the index untouched.

use super::error::{GrantError, GrantResult};
use super::proposal::Proposal;
use crate::chat::MessageId;
use crate::persistence::GrantRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Store shared between the lifecycle controller and its countdowns
pub type SharedStore = Arc<Mutex<ProposalStore>>;

/// Whether [`ProposalStore::add`] also writes to the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    /// Live creation: repository first, then memory
    Durable,
    /// Restore replay: the row is already on disk
    MemoryOnly,
}

pub struct ProposalStore {
    proposals: HashMap<MessageId, Proposal>,
    pub(super) repository: Arc<dyn GrantRepository>,
}

impl ProposalStore {
    pub fn new(repository: Arc<dyn GrantRepository>) -> Self {
        Self {
            proposals: HashMap::new(),
            repository,
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Insert a validated proposal.
    pub async fn add(&mut self, proposal: Proposal, persist: Persist) -> GrantResult<()> {
        validate(&proposal)?;

        let id = proposal.voting_message_id;
        if self.proposals.contains_key(&id) {
            return Err(GrantError::Validation(format!(
                "proposal {} is already active",
                id
            )));
        }

        if persist == Persist::Durable {
            self.repository.insert_proposal(&proposal).await?;
        }
        self.proposals.insert(id, proposal);
        debug!(voting_message_id = %id, ?persist, "proposal added");
        Ok(())
    }

    /// Look up an active proposal.
    ///
    /// A miss means the event source and the store disagree, so it is logged
    /// as an error.
    pub fn get(&self, voting_message_id: MessageId) -> GrantResult<&Proposal> {
        self.proposals.get(&voting_message_id).ok_or_else(|| {
            error!(voting_message_id = %voting_message_id, "proposal not found");
            GrantError::NotFound(voting_message_id)
        })
    }

    pub(super) fn get_mut(&mut self, voting_message_id: MessageId) -> GrantResult<&mut Proposal> {
        self.proposals.get_mut(&voting_message_id).ok_or_else(|| {
            error!(voting_message_id = %voting_message_id, "proposal not found");
            GrantError::NotFound(voting_message_id)
        })
    }

    /// Quiet existence check
    pub fn contains(&self, voting_message_id: MessageId) -> bool {
        self.proposals.contains_key(&voting_message_id)
    }

    /// Find the proposal whose command or acknowledgement message is `message`
    pub fn find_by_related_message(&self, message: MessageId) -> Option<&Proposal> {
        self.proposals
            .values()
            .find(|proposal| proposal.is_related_message(message))
    }

    /// Delete a proposal and its voters, durable store first.
    ///
    /// Returns the removed record. A second call fails with `NotFound` and
    /// changes nothing.
    pub async fn remove(&mut self, voting_message_id: MessageId) -> GrantResult<Proposal> {
        if !self.proposals.contains_key(&voting_message_id) {
            error!(voting_message_id = %voting_message_id, "remove of unknown proposal");
            return Err(GrantError::NotFound(voting_message_id));
        }

        self.repository.delete_proposal(voting_message_id).await?;
        self.proposals
            .remove(&voting_message_id)
            .ok_or(GrantError::NotFound(voting_message_id))
    }

    /// Record the remaining countdown seconds for restart recovery
    pub async fn set_remaining(
        &mut self,
        voting_message_id: MessageId,
        remaining_secs: u64,
    ) -> GrantResult<()> {
        if !self.proposals.contains_key(&voting_message_id) {
            return Err(GrantError::NotFound(voting_message_id));
        }
        self.repository
            .update_timer(voting_message_id, remaining_secs)
            .await?;
        if let Some(proposal) = self.proposals.get_mut(&voting_message_id) {
            proposal.timer_secs = remaining_secs;
        }
        Ok(())
    }

    /// Number of active proposals
    pub fn count(&self) -> usize {
        self.proposals.len()
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    /// Load every persisted proposal into memory without writing back.
    ///
    /// Returns the restored records.
    pub async fn restore(&mut self) -> GrantResult<Vec<Proposal>> {
        let loaded = self.repository.load_proposals().await?;
        let mut restored = Vec::with_capacity(loaded.len());
        for proposal in loaded {
            self.add(proposal.clone(), Persist::MemoryOnly).await?;
            restored.push(proposal);
        }
        Ok(restored)
    }
}

fn validate(proposal: &Proposal) -> GrantResult<()> {
    if proposal.voting_message_id.0 == 0 || proposal.message_id.0 == 0 {
        return Err(GrantError::Validation(
            "message identifiers must be non-zero".to_string(),
        ));
    }
    if proposal.author.0 == 0 || proposal.beneficiary.0 == 0 {
        return Err(GrantError::Validation(
            "author and beneficiary must be set".to_string(),
        ));
    }
    if proposal.amount == 0 {
        return Err(GrantError::Validation("amount must be positive".to_string()));
    }
    if proposal.description.trim().is_empty() {
        return Err(GrantError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    Ok(())
}
