//! Voter Registry.
//!
//! Opposing votes live on their proposal's voter set. As with the store, the
//! repository row is written or deleted before the in-memory set changes.

use super::error::GrantResult;
use super::proposal::Voter;
use super::store::ProposalStore;
use crate::chat::{MessageId, UserId};

impl ProposalStore {
    /// The vote `user` cast on a proposal, if any.
    ///
    /// Absence is a normal answer, including for unknown proposals.
    pub fn find_vote(&self, user: UserId, voting_message_id: MessageId) -> Option<&Voter> {
        if !self.contains(voting_message_id) {
            return None;
        }
        self.get(voting_message_id)
            .ok()?
            .voters
            .iter()
            .find(|voter| voter.user_id == user)
    }

    /// Record an opposing vote. Returns `false` if the user had already voted.
    pub async fn add_vote(&mut self, voter: Voter) -> GrantResult<bool> {
        let proposal = self.get(voter.voting_message_id)?;
        if proposal.has_voter(voter.user_id) {
            return Ok(false);
        }

        self.repository.insert_voter(&voter).await?;
        self.get_mut(voter.voting_message_id)?.voters.push(voter);
        Ok(true)
    }

    /// Retract a vote. Returns `false` if there was nothing to retract.
    pub async fn remove_vote(
        &mut self,
        user: UserId,
        voting_message_id: MessageId,
    ) -> GrantResult<bool> {
        let proposal = self.get(voting_message_id)?;
        if !proposal.has_voter(user) {
            return Ok(false);
        }

        self.repository.delete_voter(user, voting_message_id).await?;
        self.get_mut(voting_message_id)?
            .voters
            .retain(|voter| voter.user_id != user);
        Ok(true)
    }

    /// Current number of opposing votes
    pub fn vote_count(&self, voting_message_id: MessageId) -> GrantResult<usize> {
        Ok(self.get(voting_message_id)?.vote_count())
    }
}
