//! Mock Chat Client for Testing
//!
//! Records everything the bot sends and replays queued inbound events.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// First id handed out for messages the mock "sends"
const FIRST_MESSAGE_ID: u64 = 9_000;

/// Mock chat client for testing
#[derive(Clone)]
pub struct MockChatClient {
    state: Arc<Mutex<MockState>>,
    bot_id: UserId,
}

#[derive(Default)]
struct MockState {
    sent_messages: Vec<SentMessage>,
    edits: Vec<EditedMessage>,
    reactions: Vec<(ChannelId, MessageId, String)>,
    members: HashMap<UserId, Member>,
    incoming: VecDeque<ChatEvent>,
    closed: bool,
    next_message_id: u64,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub reply_to: Option<MessageId>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub channel: ChannelId,
    pub message: MessageId,
    pub content: String,
}

impl MockChatClient {
    /// Create new mock client
    pub fn new(bot_id: UserId) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_message_id: FIRST_MESSAGE_ID,
                ..Default::default()
            })),
            bot_id,
        }
    }

    /// Register a guild member so `member()` can resolve it
    pub fn add_member(&self, id: UserId, name: &str, roles: Vec<RoleId>) {
        let mut state = self.state.lock().unwrap();
        state.members.insert(
            id,
            Member {
                id,
                display_name: name.to_string(),
                roles,
            },
        );
    }

    /// Queue an inbound event for `receive_events`
    pub fn push_event(&self, event: ChatEvent) {
        self.state.lock().unwrap().incoming.push_back(event);
    }

    /// Make `receive_events` report a closed stream once the queue drains
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Get sent messages for assertions
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent_messages.clone()
    }

    /// Messages sent to a single channel
    pub fn sent_to(&self, channel: ChannelId) -> Vec<SentMessage> {
        self.state
            .lock()
            .unwrap()
            .sent_messages
            .iter()
            .filter(|msg| msg.channel == channel)
            .cloned()
            .collect()
    }

    /// Get message edits for assertions
    pub fn edits(&self) -> Vec<EditedMessage> {
        self.state.lock().unwrap().edits.clone()
    }

    /// Reactions the bot added
    pub fn reactions(&self) -> Vec<(ChannelId, MessageId, String)> {
        self.state.lock().unwrap().reactions.clone()
    }

    fn record(&self, channel: ChannelId, reply_to: Option<MessageId>, text: &str) -> MessageId {
        let mut state = self.state.lock().unwrap();
        let id = MessageId(state.next_message_id);
        state.next_message_id += 1;
        state.sent_messages.push(SentMessage {
            id,
            channel,
            reply_to,
            content: text.to_string(),
        });
        id
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn send_message(&self, channel: ChannelId, text: &str) -> ChatResult<MessageId> {
        Ok(self.record(channel, None, text))
    }

    async fn reply(
        &self,
        channel: ChannelId,
        reply_to: MessageId,
        text: &str,
    ) -> ChatResult<MessageId> {
        Ok(self.record(channel, Some(reply_to), text))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        text: &str,
    ) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.sent_messages.iter().any(|msg| msg.id == message) {
            return Err(ChatError::MessageNotFound(message));
        }
        state.edits.push(EditedMessage {
            channel,
            message,
            content: text.to_string(),
        });
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        state.reactions.push((channel, message, emoji.to_string()));
        Ok(())
    }

    async fn member(&self, user: UserId) -> ChatResult<Option<Member>> {
        Ok(self.state.lock().unwrap().members.get(&user).cloned())
    }

    async fn receive_events(&self) -> ChatResult<Vec<ChatEvent>> {
        let events: Vec<ChatEvent> = {
            let mut state = self.state.lock().unwrap();
            if state.incoming.is_empty() && state.closed {
                return Err(ChatError::Disconnected);
            }
            state.incoming.drain(..).collect()
        };
        if events.is_empty() {
            tokio::task::yield_now().await;
        }
        Ok(events)
    }

    fn message_link(&self, channel: ChannelId, message: MessageId) -> String {
        format!("https://discord.com/channels/0/{}/{}", channel, message)
    }

    fn bot_id(&self) -> UserId {
        self.bot_id
    }
}
