//! Proposal lifecycle management.
//!
//! States: Active -> Accepted | CancelledByReachingThreshold | CancelledByProposer.
//!
//! Every transition takes the store lock for its whole check-and-mutate
//! sequence, so two reactions can never both cross the threshold. Terminal
//! transitions remove the proposal (durable first) while holding the lock;
//! the ledger call and notifications go out after it is released.

use super::command::{CommandError, ProposeArgs};
use super::countdown::Countdown;
use super::error::{GrantError, GrantResult};
use super::ledger::GrantLedger;
use super::messages;
use super::proposal::{unix_now, Proposal, ProposalResult, Voter};
use super::store::{Persist, ProposalStore, SharedStore};
use crate::chat::{ChannelId, ChatClient, MessageId, RoleId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Core configuration, validated by the config layer.
#[derive(Debug, Clone)]
pub struct GrantSettings {
    /// Opposing votes needed to cancel
    pub threshold: usize,
    /// Total countdown per proposal
    pub timer: Duration,
    /// Countdown wake interval
    pub poll_interval: Duration,
    pub voting_channel: ChannelId,
    /// Roles whose members may vote
    pub allowed_roles: Vec<RoleId>,
    pub cancel_emoji: String,
    /// Who gets pinged when something needs an administrator
    pub responsible_mention: String,
}

#[derive(Clone)]
pub struct LifecycleController<C: ChatClient> {
    chat: C,
    store: SharedStore,
    ledger: Arc<dyn GrantLedger>,
    settings: Arc<GrantSettings>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<C: ChatClient> LifecycleController<C> {
    pub fn new(
        chat: C,
        store: SharedStore,
        ledger: Arc<dyn GrantLedger>,
        settings: GrantSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            chat,
            store,
            ledger,
            settings: Arc::new(settings),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn settings(&self) -> &GrantSettings {
        &self.settings
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Create a proposal from a validated `propose` command.
    ///
    /// Steps:
    /// 1. Resolve the beneficiary on the server
    /// 2. Post the voting announcement and seed it with the cancel reaction
    /// 3. Acknowledge in the command channel
    /// 4. Persist, then start the countdown
    ///
    /// Returns the voting message id.
    pub async fn create(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        author: UserId,
        args: ProposeArgs,
    ) -> GrantResult<MessageId> {
        // 1. Resolve beneficiary
        if self.chat.member(args.beneficiary).await?.is_none() {
            return Err(CommandError::InvalidUser.into());
        }

        // 2. Voting announcement
        let created_at = unix_now();
        let finishes_at = created_at + self.settings.timer.as_secs();
        let announcement = messages::voting_announcement(
            author,
            &args,
            finishes_at,
            self.settings.threshold,
            &self.settings.cancel_emoji,
        );
        let voting_channel = self.settings.voting_channel;
        let voting_message_id = self.chat.send_message(voting_channel, &announcement).await?;

        if let Err(e) = self
            .chat
            .add_reaction(voting_channel, voting_message_id, &self.settings.cancel_emoji)
            .await
        {
            warn!(voting_message_id = %voting_message_id, error = %e, "failed to seed cancel reaction");
        }

        // 3. Acknowledgement
        let voting_link = self.chat.message_link(voting_channel, voting_message_id);
        let ack = messages::acknowledgement(&args, self.settings.threshold, &voting_link);
        let bot_response_message_id = match self.chat.reply(channel_id, message_id, &ack).await {
            Ok(id) => id,
            Err(e) => {
                self.abandon(voting_message_id).await;
                return Err(e.into());
            }
        };

        // 4. Persist and start counting down
        let proposal = Proposal {
            voting_message_id,
            message_id,
            bot_response_message_id,
            channel_id,
            author,
            beneficiary: args.beneficiary,
            amount: args.amount,
            description: args.description,
            timer_secs: self.settings.timer.as_secs(),
            created_at,
            voters: Vec::new(),
        };
        if let Err(e) = self.store.lock().await.add(proposal, Persist::Durable).await {
            error!(
                voting_message_id = %voting_message_id,
                error = %e,
                responsible = %self.settings.responsible_mention,
                "failed to save proposal"
            );
            self.abandon(voting_message_id).await;
            return Err(e);
        }

        self.spawn_countdown(voting_message_id, self.settings.timer);
        info!(
            voting_message_id = %voting_message_id,
            author = %author,
            beneficiary = %args.beneficiary,
            amount = args.amount,
            "proposal created"
        );
        Ok(voting_message_id)
    }

    /// Record an opposing vote; cancels the proposal once the threshold is hit.
    ///
    /// Returns the outcome if this vote ended the proposal.
    pub async fn register_oppose(
        &self,
        user: UserId,
        voting_message_id: MessageId,
    ) -> GrantResult<Option<ProposalResult>> {
        let removed = {
            let mut store = self.store.lock().await;
            ensure_active(&store, voting_message_id)?;
            store
                .add_vote(Voter::new(user, voting_message_id))
                .await?;

            // Recount at transition time
            if store.vote_count(voting_message_id)? < self.settings.threshold {
                return Ok(None);
            }
            store.remove(voting_message_id).await?
        };

        let result = ProposalResult::CancelledByReachingThreshold;
        self.finish(&removed, result).await;
        Ok(Some(result))
    }

    /// Retract an opposing vote. Never changes state.
    ///
    /// Returns `false` if the user had not voted.
    pub async fn retract_oppose(
        &self,
        user: UserId,
        voting_message_id: MessageId,
    ) -> GrantResult<bool> {
        let mut store = self.store.lock().await;
        ensure_active(&store, voting_message_id)?;
        store.remove_vote(user, voting_message_id).await
    }

    /// Cancel on the author's request.
    pub async fn cancel_by_proposer(
        &self,
        voting_message_id: MessageId,
        requester: UserId,
    ) -> GrantResult<()> {
        let removed = {
            let mut store = self.store.lock().await;
            ensure_active(&store, voting_message_id)?;
            let proposal = store.get(voting_message_id)?;
            if proposal.author != requester {
                return Err(GrantError::Unauthorized(messages::cancel_unauthorized(
                    proposal,
                )));
            }
            store.remove(voting_message_id).await?
        };

        self.finish(&removed, ProposalResult::CancelledByProposer)
            .await;
        Ok(())
    }

    /// Resolve a proposal whose countdown ran out.
    ///
    /// Returns `None` if the proposal was already resolved.
    pub async fn resolve_on_timeout(
        &self,
        voting_message_id: MessageId,
    ) -> GrantResult<Option<ProposalResult>> {
        let (removed, result) = {
            let mut store = self.store.lock().await;
            if !store.contains(voting_message_id) {
                return Ok(None);
            }
            let result = if store.vote_count(voting_message_id)? < self.settings.threshold {
                ProposalResult::Accepted
            } else {
                ProposalResult::CancelledByReachingThreshold
            };
            (store.remove(voting_message_id).await?, result)
        };

        self.finish(&removed, result).await;
        Ok(Some(result))
    }

    /// Reload persisted proposals and resume their countdowns from the
    /// remaining time.
    pub async fn restore(&self) -> GrantResult<usize> {
        let restored = self.store.lock().await.restore().await?;
        for proposal in &restored {
            self.spawn_countdown(
                proposal.voting_message_id,
                Duration::from_secs(proposal.timer_secs),
            );
        }
        info!(count = restored.len(), "restored active proposals");
        Ok(restored.len())
    }

    /// Stop all countdowns. Active proposals stay persisted.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn is_active(&self, voting_message_id: MessageId) -> bool {
        self.store.lock().await.contains(voting_message_id)
    }

    /// Author of an active proposal
    pub async fn author_of(&self, voting_message_id: MessageId) -> Option<UserId> {
        let store = self.store.lock().await;
        if !store.contains(voting_message_id) {
            return None;
        }
        store.get(voting_message_id).ok().map(|proposal| proposal.author)
    }

    /// Voting message of the proposal that `message` belongs to, when
    /// `message` is its command or acknowledgement
    pub async fn find_related(&self, message: MessageId) -> Option<MessageId> {
        self.store
            .lock()
            .await
            .find_by_related_message(message)
            .map(|proposal| proposal.voting_message_id)
    }

    pub fn voting_link(&self, voting_message_id: MessageId) -> String {
        self.chat
            .message_link(self.settings.voting_channel, voting_message_id)
    }

    fn spawn_countdown(&self, voting_message_id: MessageId, remaining: Duration) {
        let countdown = Countdown::new(voting_message_id, remaining, self.settings.poll_interval);
        let store = self.store.clone();
        let shutdown = self.shutdown.subscribe();
        let controller = self.clone();

        tokio::spawn(async move {
            countdown
                .run(store, shutdown, || async move {
                    if let Err(e) = controller.resolve_on_timeout(voting_message_id).await {
                        error!(
                            voting_message_id = %voting_message_id,
                            error = %e,
                            responsible = %controller.settings.responsible_mention,
                            "failed to resolve expired proposal"
                        );
                    }
                })
                .await
        });
    }

    /// Side effects of a terminal transition, after the proposal is gone
    /// from the store.
    async fn finish(&self, proposal: &Proposal, result: ProposalResult) {
        let id = proposal.voting_message_id;
        info!(voting_message_id = %id, result = %result, votes = proposal.vote_count(), "proposal resolved");

        if result == ProposalResult::Accepted {
            if let Err(e) = self.ledger.grant(proposal.beneficiary, proposal.amount).await {
                error!(
                    voting_message_id = %id,
                    beneficiary = %proposal.beneficiary,
                    amount = proposal.amount,
                    error = %e,
                    responsible = %self.settings.responsible_mention,
                    "failed to apply grant"
                );
                let alert = messages::internal_error(&self.settings.responsible_mention);
                if let Err(e) = self.chat.reply(self.settings.voting_channel, id, &alert).await {
                    warn!(voting_message_id = %id, error = %e, "failed to send alert");
                }
            }
        }

        let original_link = self
            .chat
            .message_link(proposal.channel_id, proposal.message_id);
        let edited =
            messages::result_edit(proposal, result, self.settings.threshold, &original_link);
        if let Err(e) = self
            .chat
            .edit_message(self.settings.voting_channel, id, &edited)
            .await
        {
            warn!(voting_message_id = %id, error = %e, "failed to edit voting message");
        }

        let response = messages::proposer_response(
            proposal,
            result,
            self.settings.threshold,
            &self.voting_link(id),
        );
        if let Err(e) = self
            .chat
            .reply(proposal.channel_id, proposal.message_id, &response)
            .await
        {
            warn!(voting_message_id = %id, error = %e, "failed to notify proposer");
        }
    }

    /// Mark a voting message whose proposal never became active
    async fn abandon(&self, voting_message_id: MessageId) {
        let text = messages::creation_failed(&self.settings.responsible_mention);
        if let Err(e) = self
            .chat
            .edit_message(self.settings.voting_channel, voting_message_id, &text)
            .await
        {
            warn!(voting_message_id = %voting_message_id, error = %e, "failed to mark abandoned proposal");
        }
    }
}

/// A proposal missing from the store was resolved by an earlier event; a
/// request that raced with it is stale, not a consistency error.
fn ensure_active(store: &ProposalStore, voting_message_id: MessageId) -> GrantResult<()> {
    if store.contains(voting_message_id) {
        return Ok(());
    }
    debug!(voting_message_id = %voting_message_id, "proposal already resolved");
    Err(GrantError::Resolved(voting_message_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatClient;
    use crate::grants::ledger::MemoryLedger;
    use crate::grants::store::ProposalStore;
    use crate::persistence::MemoryGrantRepository;

    const AUTHOR: UserId = UserId(1);
    const BENEFICIARY: UserId = UserId(2);
    const COMMAND_CHANNEL: ChannelId = ChannelId(100);
    const VOTING_CHANNEL: ChannelId = ChannelId(200);

    struct Harness {
        controller: LifecycleController<MockChatClient>,
        chat: MockChatClient,
        ledger: Arc<MemoryLedger>,
        repo: Arc<MemoryGrantRepository>,
    }

    fn settings(threshold: usize) -> GrantSettings {
        GrantSettings {
            threshold,
            timer: Duration::from_secs(20),
            poll_interval: Duration::from_secs(1),
            voting_channel: VOTING_CHANNEL,
            allowed_roles: vec![RoleId(7)],
            cancel_emoji: "❌".to_string(),
            responsible_mention: "<@999>".to_string(),
        }
    }

    fn harness(threshold: usize) -> Harness {
        let chat = MockChatClient::new(UserId(500));
        chat.add_member(AUTHOR, "author", vec![RoleId(7)]);
        chat.add_member(BENEFICIARY, "beneficiary", vec![]);
        let repo = Arc::new(MemoryGrantRepository::new());
        let ledger = Arc::new(MemoryLedger::new());
        let store = ProposalStore::new(repo.clone()).shared();
        let controller =
            LifecycleController::new(chat.clone(), store, ledger.clone(), settings(threshold));
        Harness {
            controller,
            chat,
            ledger,
            repo,
        }
    }

    fn args(amount: u64) -> ProposeArgs {
        ProposeArgs {
            beneficiary: BENEFICIARY,
            amount,
            description: "for writing docs".to_string(),
        }
    }

    async fn create(h: &Harness) -> MessageId {
        h.controller
            .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, args(100))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_posts_and_persists() {
        let h = harness(3);
        let voting = create(&h).await;

        let announcements = h.chat.sent_to(VOTING_CHANNEL);
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].id, voting);
        assert!(h.chat.reactions().contains(&(VOTING_CHANNEL, voting, "❌".to_string())));

        let acks = h.chat.sent_to(COMMAND_CHANNEL);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].reply_to, Some(MessageId(1)));

        assert!(h.controller.is_active(voting).await);
        assert_eq!(h.repo.proposal_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_unknown_beneficiary() {
        let h = harness(3);
        let mut bad = args(100);
        bad.beneficiary = UserId(404);

        let result = h
            .controller
            .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, bad)
            .await;

        assert!(matches!(
            result,
            Err(GrantError::InvalidCommand(CommandError::InvalidUser))
        ));
        assert!(h.chat.sent_messages().is_empty());
        assert_eq!(h.repo.proposal_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_persistence_failure() {
        let h = harness(3);
        h.repo.set_fail_writes(true);

        let result = h
            .controller
            .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, args(100))
            .await;

        assert!(matches!(result, Err(GrantError::Persistence(_))));
        assert_eq!(h.controller.store().lock().await.count(), 0);
        let edits = h.chat.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].content.contains("<@999>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_cancels_immediately() {
        let h = harness(2);
        let voting = create(&h).await;

        assert_eq!(h.controller.register_oppose(UserId(10), voting).await.unwrap(), None);
        let result = h.controller.register_oppose(UserId(11), voting).await.unwrap();

        assert_eq!(result, Some(ProposalResult::CancelledByReachingThreshold));
        assert!(!h.controller.is_active(voting).await);
        assert_eq!(h.repo.proposal_count(), 0);
        assert_eq!(h.repo.voter_count(), 0);
        assert!(h.ledger.grants().is_empty());

        let edits = h.chat.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].content.contains("<@10>, <@11>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_after_resolution_are_stale() {
        let h = harness(1);
        let voting = create(&h).await;
        h.controller.register_oppose(UserId(10), voting).await.unwrap();

        let late_vote = h.controller.register_oppose(UserId(11), voting).await;
        assert!(matches!(late_vote, Err(GrantError::Resolved(id)) if id == voting));

        let late_retract = h.controller.retract_oppose(UserId(10), voting).await;
        assert!(matches!(late_retract, Err(GrantError::Resolved(_))));

        let late_cancel = h.controller.cancel_by_proposer(voting, AUTHOR).await;
        assert!(matches!(late_cancel, Err(GrantError::Resolved(_))));

        assert_eq!(h.repo.voter_count(), 0);
        assert_eq!(h.chat.edits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_vote_counts_once() {
        let h = harness(2);
        let voting = create(&h).await;

        h.controller.register_oppose(UserId(10), voting).await.unwrap();
        let again = h.controller.register_oppose(UserId(10), voting).await.unwrap();

        assert_eq!(again, None);
        assert!(h.controller.is_active(voting).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retract() {
        let h = harness(2);
        let voting = create(&h).await;
        h.controller.register_oppose(UserId(10), voting).await.unwrap();

        assert!(h.controller.retract_oppose(UserId(10), voting).await.unwrap());
        assert!(!h.controller.retract_oppose(UserId(10), voting).await.unwrap());

        // One more vote does not reach the threshold of 2
        assert_eq!(h.controller.register_oppose(UserId(11), voting).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_proposer() {
        let h = harness(3);
        let voting = create(&h).await;

        let denied = h.controller.cancel_by_proposer(voting, UserId(10)).await;
        assert!(matches!(denied, Err(GrantError::Unauthorized(_))));
        assert!(h.controller.is_active(voting).await);

        h.controller.cancel_by_proposer(voting, AUTHOR).await.unwrap();
        assert!(!h.controller.is_active(voting).await);
        assert!(h.ledger.grants().is_empty());

        let replies = h.chat.sent_to(COMMAND_CHANNEL);
        assert!(replies.last().unwrap().content.contains("has cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_proposer_with_opposing_votes() {
        let h = harness(3);
        let voting = create(&h).await;
        h.controller.register_oppose(UserId(10), voting).await.unwrap();
        h.controller.register_oppose(UserId(11), voting).await.unwrap();
        assert_eq!(h.repo.voter_count(), 2);

        h.controller.cancel_by_proposer(voting, AUTHOR).await.unwrap();

        assert!(!h.controller.is_active(voting).await);
        assert_eq!(h.repo.proposal_count(), 0);
        assert_eq!(h.repo.voter_count(), 0);

        let edits = h.chat.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].content.contains("cancelled by the proposer"));
        assert!(!edits[0].content.contains("opposition"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.ledger.grants().is_empty());
        assert_eq!(h.chat.edits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_accepts() {
        let h = harness(3);
        let voting = create(&h).await;
        h.controller.register_oppose(UserId(10), voting).await.unwrap();

        tokio::time::sleep(Duration::from_secs(21)).await;

        assert!(!h.controller.is_active(voting).await);
        assert_eq!(h.ledger.grants(), vec![(BENEFICIARY, 100)]);
        let replies = h.chat.sent_to(COMMAND_CHANNEL);
        assert!(replies.last().unwrap().content.contains("Hooray"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_twice_is_noop() {
        let h = harness(3);
        let voting = create(&h).await;

        let first = h.controller.resolve_on_timeout(voting).await.unwrap();
        let second = h.controller.resolve_on_timeout(voting).await.unwrap();

        assert_eq!(first, Some(ProposalResult::Accepted));
        assert_eq!(second, None);
        assert_eq!(h.ledger.grants().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_proposal() {
        let h = harness(3);
        let voting = create(&h).await;

        h.controller.shutdown();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(h.controller.is_active(voting).await);
        assert!(h.ledger.grants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_related() {
        let h = harness(3);
        let voting = create(&h).await;
        let ack = h.chat.sent_to(COMMAND_CHANNEL)[0].id;

        assert_eq!(h.controller.find_related(MessageId(1)).await, Some(voting));
        assert_eq!(h.controller.find_related(ack).await, Some(voting));
        assert_eq!(h.controller.find_related(voting).await, None);
    }
}
