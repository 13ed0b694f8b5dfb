//! Chat Client Trait Abstractions
//!
//! The proposal system only talks to the chat platform through [`ChatClient`],
//! so tests run against `MockChatClient` and production runs against the
//! Discord adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Chat user identifier
    UserId
);
snowflake!(
    /// Channel identifier
    ChannelId
);
snowflake!(
    /// Message identifier
    MessageId
);
snowflake!(
    /// Role identifier
    RoleId
);

impl UserId {
    /// Render as a mention (`<@id>`), which the platform expands to a name.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

/// Guild member as seen by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
}

impl Member {
    /// Whether the member holds at least one of `allowed`.
    pub fn has_any_role(&self, allowed: &[RoleId]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }
}

/// Inbound events the bot reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A new text message in a channel the bot can read
    Message(IncomingMessage),
    /// A reaction was added to a message
    ReactionAdded(ReactionEvent),
    /// A reaction was removed from a message
    ReactionRemoved(ReactionEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author: UserId,
    pub content: String,
    pub mentions_bot: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat client errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Event stream closed")]
    Disconnected,
}

/// Chat client abstraction
///
/// Implementations must be cheap to clone; clones share the same connection.
#[async_trait]
pub trait ChatClient: Clone + Send + Sync + 'static {
    /// Post a message to a channel, returning its id
    async fn send_message(&self, channel: ChannelId, text: &str) -> ChatResult<MessageId>;

    /// Post a message in `channel` that replies to `reply_to`
    async fn reply(
        &self,
        channel: ChannelId,
        reply_to: MessageId,
        text: &str,
    ) -> ChatResult<MessageId>;

    /// Replace the content of a message the bot previously sent
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        text: &str,
    ) -> ChatResult<()>;

    /// React to a message with a unicode emoji
    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> ChatResult<()>;

    /// Look up a guild member.
    ///
    /// Returns `Ok(None)` when the user is not on the server.
    async fn member(&self, user: UserId) -> ChatResult<Option<Member>>;

    /// Wait for the next batch of inbound events
    async fn receive_events(&self) -> ChatResult<Vec<ChatEvent>>;

    /// Permanent link to a message
    fn message_link(&self, channel: ChannelId, message: MessageId) -> String;

    /// The bot's own user id
    fn bot_id(&self) -> UserId;
}
