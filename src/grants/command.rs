//! Command parsing for `propose` and `cancel`.
//!
//! Syntax (prefix configurable, `!` by default):
//! - !propose <@mention> <amount> <description...>
//! - !cancel <voting-message-id>
//! - !help
//!
//! Parsing is pure text work. Whether the mentioned user exists on the server
//! is checked later against the chat client.

use crate::chat::{MessageId, UserId};

pub const PROPOSE_COMMAND: &str = "propose";
pub const CANCEL_COMMAND: &str = "cancel";
pub const HELP_COMMAND: &str = "help";

/// A recognised bot command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Everything after `propose`, unparsed
    Propose { raw_args: String },
    Cancel { voting_message_id: Option<MessageId> },
    Help,
}

/// Parsed `propose` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposeArgs {
    pub beneficiary: UserId,
    pub amount: u64,
    pub description: String,
}

/// Validation failures for `propose`, each with its own user-facing message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("no mention found")]
    NoMention,

    #[error("mention must directly follow the command")]
    InvalidFormat,

    #[error("mentioned user is not on the server")]
    InvalidUser,

    #[error("amount is not an integer")]
    InvalidAmount,

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),

    #[error("description is missing")]
    MissingDescription,
}

/// Recognise a command in a chat message.
///
/// Returns `None` for anything that is not addressed to the bot.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        PROPOSE_COMMAND => Some(Command::Propose {
            raw_args: args.to_string(),
        }),
        CANCEL_COMMAND => Some(Command::Cancel {
            voting_message_id: args.parse().ok().map(MessageId),
        }),
        HELP_COMMAND => Some(Command::Help),
        _ => None,
    }
}

/// Parse `<@mention> <amount> <description...>`.
///
/// Error precedence: missing mention, mention not in first position, amount
/// not an integer, amount not positive, missing description.
pub fn parse_propose_args(raw_args: &str) -> Result<ProposeArgs, CommandError> {
    let mut tokens = raw_args.split_whitespace();

    let first = tokens.next().ok_or(CommandError::NoMention)?;
    let beneficiary = match parse_mention(first) {
        Some(user) => user,
        None if raw_args.split_whitespace().any(|t| parse_mention(t).is_some()) => {
            return Err(CommandError::InvalidFormat)
        }
        None => return Err(CommandError::NoMention),
    };

    let amount_token = tokens.next().ok_or(CommandError::InvalidAmount)?;
    let amount: i64 = amount_token
        .parse()
        .map_err(|_| CommandError::InvalidAmount)?;
    if amount <= 0 {
        return Err(CommandError::NonPositiveAmount(amount_token.to_string()));
    }

    let description = tokens.collect::<Vec<_>>().join(" ");
    if description.is_empty() {
        return Err(CommandError::MissingDescription);
    }

    Ok(ProposeArgs {
        beneficiary,
        amount: amount as u64,
        description,
    })
}

/// Parse a user mention: `<@123>` or the nickname form `<@!123>`.
pub fn parse_mention(token: &str) -> Option<UserId> {
    let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
    let digits = inner.strip_prefix('!').unwrap_or(inner);
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(UserId(id)),
    }
}
