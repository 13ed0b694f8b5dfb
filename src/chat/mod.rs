//! Chat Platform Integration Module
//!
//! The bot reads commands and reactions from a chat server and answers in
//! channels. Everything platform-specific stays behind [`ChatClient`].

pub mod discord;
pub mod mock;
pub mod traits;

pub use discord::DiscordClient;
pub use mock::MockChatClient;
pub use traits::{
    ChannelId, ChatClient, ChatError, ChatEvent, ChatResult, IncomingMessage, Member, MessageId,
    ReactionEvent, RoleId, UserId,
};
