//! Grant proposal records.

use crate::chat::{ChannelId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// An active grant proposal, keyed by its voting message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Message in the voting channel that collects opposing reactions
    pub voting_message_id: MessageId,
    /// The `propose` command message
    pub message_id: MessageId,
    /// The bot's acknowledgement in the command channel
    pub bot_response_message_id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserId,
    /// Who receives the points
    pub beneficiary: UserId,
    pub amount: u64,
    pub description: String,
    /// Seconds left on the countdown
    pub timer_secs: u64,
    /// Unix seconds
    pub created_at: u64,
    pub voters: Vec<Voter>,
}

impl Proposal {
    pub fn vote_count(&self) -> usize {
        self.voters.len()
    }

    pub fn has_voter(&self, user: UserId) -> bool {
        self.voters.iter().any(|voter| voter.user_id == user)
    }

    /// Whether `message` is the command or the bot's acknowledgement for this proposal
    pub fn is_related_message(&self, message: MessageId) -> bool {
        self.message_id == message || self.bot_response_message_id == message
    }
}

/// A member opposing a proposal. At most one per (user, proposal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub user_id: UserId,
    pub voting_message_id: MessageId,
    pub voted_at: u64,
}

impl Voter {
    pub fn new(user_id: UserId, voting_message_id: MessageId) -> Self {
        Self {
            user_id,
            voting_message_id,
            voted_at: unix_now(),
        }
    }
}

/// Terminal outcome of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalResult {
    Accepted,
    CancelledByReachingThreshold,
    CancelledByProposer,
}

impl ProposalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalResult::Accepted => "Accepted",
            ProposalResult::CancelledByReachingThreshold => "CancelledByReachingThreshold",
            ProposalResult::CancelledByProposer => "CancelledByProposer",
        }
    }
}

impl fmt::Display for ProposalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
