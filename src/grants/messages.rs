//! User-facing message texts.

use super::command::{CommandError, ProposeArgs, PROPOSE_COMMAND};
use super::proposal::{Proposal, ProposalResult};
use crate::chat::{MessageId, UserId};

/// Usage text, shown for `help` and after format errors
pub fn command_format(prefix: &str, author: UserId) -> String {
    let command = format!("{}{}", prefix, PROPOSE_COMMAND);
    let author = author.mention();
    format!(
        "Hi {author}! This command should look like:\n\n\
         `{command} @username amount description`\n\n\
         > @username - the user you would like to reward.\n\
         > amount - how many points you would like to give.\n\
         > description - a text that should explain for others what the grant is given for \
         (this is required). If the grant will be applied, I'll post this message.\n\n\
         Some examples:\n\
         {command} {author} 100 for being awesome\n\
         {command} {author} 100 for using Lazy Consensus bot"
    )
}

/// Message for a failed `propose` command
pub fn command_error(prefix: &str, error: &CommandError) -> String {
    let command = format!("{}{}", prefix, PROPOSE_COMMAND);
    match error {
        CommandError::NoMention => {
            "No mentions found. Please mention the user you want to propose the grant to."
                .to_string()
        }
        CommandError::InvalidFormat => format!(
            "The mention must follow after `{command} `. Example: `{command} @mention`."
        ),
        CommandError::InvalidUser => {
            "Unable to resolve username. Is the user on this Discord server?".to_string()
        }
        CommandError::InvalidAmount => format!(
            "The amount must be a positive integer. Example: `{command} @mention 100`."
        ),
        CommandError::NonPositiveAmount(amount) => {
            format!("The amount must be a positive integer: {amount}")
        }
        CommandError::MissingDescription => format!(
            "Please provide a description of the grant, like this: \
             `{command} @mention amount description`."
        ),
    }
}

/// Acknowledgement posted in the channel where the command was issued
pub fn acknowledgement(args: &ProposeArgs, threshold: usize, voting_link: &str) -> String {
    format!(
        "Alright, let's make this happen! You're proposing to give {} {} points, but watch out! \
         If {} or more members vote against it, the deal's off. \
         Anyone who objects can make their voices heard here: {}",
        args.beneficiary.mention(),
        args.amount,
        threshold,
        voting_link
    )
}

/// Announcement in the voting channel
pub fn voting_announcement(
    author: UserId,
    args: &ProposeArgs,
    finishes_at: u64,
    threshold: usize,
    emoji: &str,
) -> String {
    format!(
        ":rocket: <t:{finishes_at}:R> will grant {} points to {} as proposed by {}, \
         unless {threshold} members react with {emoji} to this message before <t:{finishes_at}:f>.\n\
         Goal: {}",
        args.amount,
        args.beneficiary.mention(),
        author.mention(),
        args.description
    )
}

/// Replacement text for the voting message once the proposal is resolved
pub fn result_edit(
    proposal: &Proposal,
    result: ProposalResult,
    threshold: usize,
    original_link: &str,
) -> String {
    let outcome = match result {
        ProposalResult::Accepted => "The grant has been given!".to_string(),
        ProposalResult::CancelledByReachingThreshold => format!(
            "The proposal has been cancelled due to opposition from {} members: {}",
            threshold,
            voters_list(proposal)
        ),
        ProposalResult::CancelledByProposer => {
            "The proposal has been cancelled by the proposer.".to_string()
        }
    };

    format!(
        "The {} point proposal for {} by {} has come to a close. {}\n\
         Goal: {}\n\
         The original proposal: {}",
        proposal.amount,
        proposal.beneficiary.mention(),
        proposal.author.mention(),
        outcome,
        proposal.description,
        original_link
    )
}

/// Reply to the proposer's command message once the proposal is resolved
pub fn proposer_response(
    proposal: &Proposal,
    result: ProposalResult,
    threshold: usize,
    voting_link: &str,
) -> String {
    match result {
        ProposalResult::Accepted => format!(
            "Hooray! The grant has been given and {} is now richer by {} points!",
            proposal.beneficiary.mention(),
            proposal.amount
        ),
        ProposalResult::CancelledByReachingThreshold => format!(
            "Sorry, {}, but it looks like {} members weren't on board with your proposal: {}",
            proposal.author.mention(),
            threshold,
            voting_link
        ),
        ProposalResult::CancelledByProposer => format!(
            "Oh well, {} has cancelled the proposal.",
            proposal.author.mention()
        ),
    }
}

/// Voting message text when the proposal could not be saved
pub fn creation_failed(responsible_mention: &str) -> String {
    format!(
        "This proposal could not be saved and is not active. {} please take a look.",
        responsible_mention
    )
}

pub fn cancel_unauthorized(proposal: &Proposal) -> String {
    format!(
        "Only {} can cancel this proposal.",
        proposal.author.mention()
    )
}

pub fn cancel_usage(prefix: &str) -> String {
    format!(
        "Please tell me which proposal to cancel: `{}cancel <voting message id>`.",
        prefix
    )
}

pub fn no_such_proposal(voting_message_id: MessageId) -> String {
    format!(
        "There is no active proposal with voting message id {}.",
        voting_message_id
    )
}

/// Reply to a reaction placed on the command or acknowledgement instead of
/// the voting message
pub fn wrong_message(user: UserId, voting_link: &str) -> String {
    format!(
        "{}, votes only count on the voting message: {}",
        user.mention(),
        voting_link
    )
}

pub fn internal_error(responsible_mention: &str) -> String {
    format!(
        "Something went wrong while handling this. {} please take a look.",
        responsible_mention
    )
}

fn voters_list(proposal: &Proposal) -> String {
    proposal
        .voters
        .iter()
        .map(|voter| voter.user_id.mention())
        .collect::<Vec<_>>()
        .join(", ")
}
