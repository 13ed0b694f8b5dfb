//! Production Chat Client Implementation
//!
//! Implements ChatClient on top of serenity. The gateway pushes events into an
//! `EventForwarder`, which converts them to [`ChatEvent`]s and hands them to
//! `receive_events` through a bounded channel. REST calls go through the shared
//! `Http` client.

use super::traits::*;
use async_trait::async_trait;
use serenity::all::{
    ChannelId as DiscordChannelId, Context, CreateMessage, EditMessage, EventHandler,
    GatewayIntents, GuildId, Http, Message, MessageId as DiscordMessageId, Reaction,
    ReactionType, Ready, UserId as DiscordUserId,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Inbound events buffered between the gateway and the bot loop
const EVENT_BUFFER: usize = 256;

/// Discord client implementation
#[derive(Clone)]
pub struct DiscordClient {
    http: Arc<Http>,
    guild_id: GuildId,
    bot_id: UserId,
    events: Arc<Mutex<mpsc::Receiver<ChatEvent>>>,
}

impl DiscordClient {
    /// Build the gateway client and the REST-side handle.
    ///
    /// The returned `serenity::Client` must be started (`client.start()`) for
    /// events to flow.
    pub async fn connect(token: &str, guild_id: u64) -> ChatResult<(Self, serenity::Client)> {
        if guild_id == 0 {
            return Err(ChatError::Network("guild_id must be set".to_string()));
        }

        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_REACTIONS;

        let gateway = serenity::Client::builder(token, intents)
            .event_handler(EventForwarder { events: sender })
            .await
            .map_err(network)?;

        let http = Arc::clone(&gateway.http);
        let me = http.get_current_user().await.map_err(network)?;

        let client = Self {
            http,
            guild_id: GuildId::new(guild_id),
            bot_id: UserId(me.id.get()),
            events: Arc::new(Mutex::new(receiver)),
        };
        Ok((client, gateway))
    }
}

fn network(err: serenity::Error) -> ChatError {
    ChatError::Network(err.to_string())
}

fn is_not_found(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(http_err) => {
            http_err.status_code().map(|status| status.as_u16()) == Some(404)
        }
        _ => false,
    }
}

fn channel(id: ChannelId) -> ChatResult<DiscordChannelId> {
    if id.0 == 0 {
        return Err(ChatError::ChannelNotFound(id));
    }
    Ok(DiscordChannelId::new(id.0))
}

fn message(id: MessageId) -> ChatResult<DiscordMessageId> {
    if id.0 == 0 {
        return Err(ChatError::MessageNotFound(id));
    }
    Ok(DiscordMessageId::new(id.0))
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn send_message(&self, channel_id: ChannelId, text: &str) -> ChatResult<MessageId> {
        let sent = channel(channel_id)?
            .say(&self.http, text)
            .await
            .map_err(network)?;
        Ok(MessageId(sent.id.get()))
    }

    async fn reply(
        &self,
        channel_id: ChannelId,
        reply_to: MessageId,
        text: &str,
    ) -> ChatResult<MessageId> {
        let target = channel(channel_id)?;
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((target, message(reply_to)?));
        let sent = target
            .send_message(&self.http, builder)
            .await
            .map_err(network)?;
        Ok(MessageId(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        text: &str,
    ) -> ChatResult<()> {
        channel(channel_id)?
            .edit_message(
                &self.http,
                message(message_id)?,
                EditMessage::new().content(text),
            )
            .await
            .map_err(network)?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> ChatResult<()> {
        channel(channel_id)?
            .create_reaction(
                &self.http,
                message(message_id)?,
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(network)
    }

    async fn member(&self, user: UserId) -> ChatResult<Option<Member>> {
        if user.0 == 0 {
            return Ok(None);
        }
        match self
            .guild_id
            .member(&self.http, DiscordUserId::new(user.0))
            .await
        {
            Ok(member) => Ok(Some(Member {
                id: user,
                display_name: member.display_name().to_string(),
                roles: member.roles.iter().map(|role| RoleId(role.get())).collect(),
            })),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(network(err)),
        }
    }

    async fn receive_events(&self) -> ChatResult<Vec<ChatEvent>> {
        let mut events = self.events.lock().await;
        let first = events.recv().await.ok_or(ChatError::Disconnected)?;

        let mut batch = vec![first];
        while let Ok(next) = events.try_recv() {
            batch.push(next);
        }
        Ok(batch)
    }

    fn message_link(&self, channel: ChannelId, message: MessageId) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id.get(),
            channel,
            message
        )
    }

    fn bot_id(&self) -> UserId {
        self.bot_id
    }
}

/// Gateway event handler that forwards into the bot's event channel
struct EventForwarder {
    events: mpsc::Sender<ChatEvent>,
}

impl EventForwarder {
    async fn forward(&self, event: ChatEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Bot event loop has stopped, dropping gateway event");
        }
    }

    fn reaction_event(reaction: &Reaction) -> Option<ReactionEvent> {
        let user_id = reaction.user_id?;
        Some(ReactionEvent {
            channel_id: ChannelId(reaction.channel_id.get()),
            message_id: MessageId(reaction.message_id.get()),
            user_id: UserId(user_id.get()),
            emoji: reaction.emoji.to_string(),
        })
    }
}

#[serenity::async_trait]
impl EventHandler for EventForwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "Connected to Discord gateway");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let bot_id = ctx.cache.current_user().id;
        let event = ChatEvent::Message(IncomingMessage {
            channel_id: ChannelId(msg.channel_id.get()),
            message_id: MessageId(msg.id.get()),
            author: UserId(msg.author.id.get()),
            mentions_bot: msg.mentions_user_id(bot_id),
            content: msg.content,
        });
        self.forward(event).await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        if let Some(event) = Self::reaction_event(&reaction) {
            self.forward(ChatEvent::ReactionAdded(event)).await;
        }
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        if let Some(event) = Self::reaction_event(&reaction) {
            self.forward(ChatEvent::ReactionRemoved(event)).await;
        }
    }
}
