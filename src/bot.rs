//! Lazy Consensus Bot
//!
//! Event loop that:
//! - Parses `propose`, `cancel` and `help` commands
//! - Filters cancel-emoji reactions to members with an allowed role
//! - Routes votes, retractions and proposer cancels into the lifecycle
//! - Waves back when mentioned

use crate::chat::{ChannelId, ChatClient, ChatError, ChatEvent, IncomingMessage, MessageId, ReactionEvent};
use crate::grants::{
    messages, parse_command, parse_propose_args, Command, GrantError, GrantResult,
    LifecycleController,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Settings the event loop needs beyond the lifecycle's
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub command_prefix: String,
    /// Reaction added to messages that mention the bot
    pub mention_reaction: String,
}

pub struct GrantBot<C: ChatClient> {
    chat: C,
    controller: LifecycleController<C>,
    settings: BotSettings,
}

impl<C: ChatClient> GrantBot<C> {
    pub fn new(chat: C, controller: LifecycleController<C>, settings: BotSettings) -> Self {
        Self {
            chat,
            controller,
            settings,
        }
    }

    pub fn controller(&self) -> &LifecycleController<C> {
        &self.controller
    }

    /// Process events until the stream closes or `shutdown` flips to true.
    ///
    /// Failures in individual events are logged and never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> GrantResult<()> {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let events = tokio::select! {
                events = self.chat.receive_events() => events,
                _ = shutdown.changed() => break,
            };

            let events = match events {
                Ok(events) => events,
                Err(ChatError::Disconnected) => {
                    info!("event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "error receiving events, will retry");
                    continue;
                }
            };

            for event in events {
                self.handle_event(event).await;
            }
        }

        Ok(())
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => self.handle_message(message).await,
            ChatEvent::ReactionAdded(reaction) => {
                let (channel, message) = (reaction.channel_id, reaction.message_id);
                if let Err(e) = self.handle_reaction(reaction, true).await {
                    self.report(e, channel, message, false).await;
                }
            }
            ChatEvent::ReactionRemoved(reaction) => {
                let (channel, message) = (reaction.channel_id, reaction.message_id);
                if let Err(e) = self.handle_reaction(reaction, false).await {
                    self.report(e, channel, message, false).await;
                }
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) {
        if message.author == self.chat.bot_id() {
            return;
        }

        if message.mentions_bot {
            if let Err(e) = self
                .chat
                .add_reaction(
                    message.channel_id,
                    message.message_id,
                    &self.settings.mention_reaction,
                )
                .await
            {
                warn!(error = %e, "failed to wave back");
            }
        }

        let Some(command) = parse_command(&self.settings.command_prefix, &message.content) else {
            return;
        };

        if let Err(e) = self.handle_command(&message, command).await {
            self.report(e, message.channel_id, message.message_id, true)
                .await;
        }
    }

    async fn handle_command(&self, message: &IncomingMessage, command: Command) -> GrantResult<()> {
        let prefix = &self.settings.command_prefix;
        match command {
            Command::Help => {
                let text = messages::command_format(prefix, message.author);
                self.respond(message, &text).await
            }
            Command::Propose { raw_args } => {
                let args = parse_propose_args(&raw_args)?;
                self.controller
                    .create(message.channel_id, message.message_id, message.author, args)
                    .await?;
                Ok(())
            }
            Command::Cancel {
                voting_message_id: None,
            } => self.respond(message, &messages::cancel_usage(prefix)).await,
            Command::Cancel {
                voting_message_id: Some(id),
            } => {
                if !self.controller.is_active(id).await {
                    return self.respond(message, &messages::no_such_proposal(id)).await;
                }
                self.controller.cancel_by_proposer(id, message.author).await
            }
        }
    }

    async fn handle_reaction(&self, reaction: ReactionEvent, added: bool) -> GrantResult<()> {
        if reaction.user_id == self.chat.bot_id() {
            return Ok(());
        }
        if reaction.emoji != self.controller.settings().cancel_emoji {
            return Ok(());
        }

        let Some(author) = self.controller.author_of(reaction.message_id).await else {
            if added {
                self.point_to_voting_message(&reaction).await?;
            }
            return Ok(());
        };

        if author == reaction.user_id {
            // The proposer's cancel reaction cancels; taking it back does nothing
            if added {
                self.controller
                    .cancel_by_proposer(reaction.message_id, reaction.user_id)
                    .await?;
            }
            return Ok(());
        }

        let allowed = &self.controller.settings().allowed_roles;
        let authorized = self
            .chat
            .member(reaction.user_id)
            .await?
            .is_some_and(|member| member.has_any_role(allowed));
        if !authorized {
            debug!(user = %reaction.user_id, message = %reaction.message_id, "ignoring reaction from member without voting role");
            return Ok(());
        }

        if added {
            self.controller
                .register_oppose(reaction.user_id, reaction.message_id)
                .await?;
        } else {
            self.controller
                .retract_oppose(reaction.user_id, reaction.message_id)
                .await?;
        }
        Ok(())
    }

    /// Reply to a reaction on a proposal's command or acknowledgement message
    async fn point_to_voting_message(&self, reaction: &ReactionEvent) -> GrantResult<()> {
        if let Some(voting) = self.controller.find_related(reaction.message_id).await {
            let text = messages::wrong_message(reaction.user_id, &self.controller.voting_link(voting));
            self.chat
                .reply(reaction.channel_id, reaction.message_id, &text)
                .await?;
        }
        Ok(())
    }

    async fn respond(&self, message: &IncomingMessage, text: &str) -> GrantResult<()> {
        self.chat
            .reply(message.channel_id, message.message_id, text)
            .await?;
        Ok(())
    }

    /// Log a failure and tell the user when it is theirs to fix.
    async fn report(&self, err: GrantError, channel: ChannelId, message: MessageId, from_command: bool) {
        let responsible = &self.controller.settings().responsible_mention;
        let reply = match &err {
            GrantError::InvalidCommand(e) => {
                debug!(error = %e, "rejected command");
                Some(messages::command_error(&self.settings.command_prefix, e))
            }
            GrantError::Unauthorized(text) => {
                debug!(error = %err, "unauthorized request");
                Some(text.clone())
            }
            GrantError::Resolved(id) => {
                debug!(voting_message_id = %id, "request arrived after the proposal was resolved");
                from_command.then(|| messages::no_such_proposal(*id))
            }
            GrantError::NotFound(id) => {
                error!(voting_message_id = %id, responsible = %responsible, "event refers to unknown proposal");
                None
            }
            _ => {
                error!(error = %err, responsible = %responsible, "failed to handle event");
                from_command.then(|| messages::internal_error(responsible))
            }
        };

        if let Some(text) = reply {
            if let Err(e) = self.chat.reply(channel, message, &text).await {
                warn!(error = %e, "failed to send reply");
            }
        }
    }
}
