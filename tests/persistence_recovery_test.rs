//! Integration tests for restart recovery.
//!
//! These tests validate the complete recovery flow against an on-disk SQLite
//! database:
//! - Bot creates proposals and records votes → stops → restarts → resumes
//! - A resumed countdown still resolves and applies the grant
//! - Resolved proposals leave nothing behind to restore
//!
//! Real time is used throughout; SQLite runs its own worker threads.

use lazy_consensus::chat::{ChannelId, MessageId, MockChatClient, RoleId, UserId};
use lazy_consensus::grants::{
    GrantSettings, LifecycleController, ProposalResult, ProposalStore, ProposeArgs,
};
use lazy_consensus::persistence::{GrantRepository, SqliteGrantRepository};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const AUTHOR: UserId = UserId(1);
const BENEFICIARY: UserId = UserId(2);
const COMMAND_CHANNEL: ChannelId = ChannelId(100);
const VOTING_CHANNEL: ChannelId = ChannelId(200);

// === Test Fixtures ===

fn settings(timer: Duration) -> GrantSettings {
    GrantSettings {
        threshold: 3,
        timer,
        poll_interval: Duration::from_millis(200).min(timer),
        voting_channel: VOTING_CHANNEL,
        allowed_roles: vec![RoleId(7)],
        cancel_emoji: "❌".to_string(),
        responsible_mention: "<@999>".to_string(),
    }
}

fn chat() -> MockChatClient {
    let chat = MockChatClient::new(UserId(500));
    chat.add_member(AUTHOR, "author", vec![RoleId(7)]);
    chat.add_member(BENEFICIARY, "beneficiary", vec![]);
    chat
}

/// Open the database and build a controller on top of it
async fn start(
    path: &Path,
    timer: Duration,
) -> (
    LifecycleController<MockChatClient>,
    Arc<SqliteGrantRepository>,
) {
    let repository = Arc::new(SqliteGrantRepository::open(path).await.unwrap());
    let store = ProposalStore::new(repository.clone()).shared();
    let controller = LifecycleController::new(chat(), store, repository.clone(), settings(timer));
    (controller, repository)
}

async fn stop(controller: LifecycleController<MockChatClient>, repository: Arc<SqliteGrantRepository>) {
    controller.shutdown();
    // Let countdowns observe the shutdown before the pool closes
    tokio::time::sleep(Duration::from_millis(50)).await;
    repository.close().await;
}

fn args(amount: u64) -> ProposeArgs {
    ProposeArgs {
        beneficiary: BENEFICIARY,
        amount,
        description: "for keeping the lights on".to_string(),
    }
}

// === Tests ===

#[tokio::test]
async fn test_restart_restores_proposals_and_votes() {
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("bot.db");
    let timer = Duration::from_secs(3600);

    let (controller, repository) = start(&db, timer).await;
    let voting = controller
        .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, args(100))
        .await
        .unwrap();
    controller.register_oppose(UserId(10), voting).await.unwrap();
    controller.register_oppose(UserId(11), voting).await.unwrap();
    stop(controller, repository).await;

    let (controller, repository) = start(&db, timer).await;
    assert_eq!(controller.restore().await.unwrap(), 1);

    {
        let store = controller.store().lock().await;
        let proposal = store.get(voting).unwrap();
        assert_eq!(proposal.amount, 100);
        assert_eq!(proposal.author, AUTHOR);
        assert_eq!(proposal.vote_count(), 2);
        assert!(proposal.timer_secs <= 3600);
        assert!(store.find_vote(UserId(10), voting).is_some());
    }

    // The third vote after the restart reaches the threshold
    let result = controller.register_oppose(UserId(12), voting).await.unwrap();
    assert_eq!(result, Some(ProposalResult::CancelledByReachingThreshold));
    assert!(repository.load_proposals().await.unwrap().is_empty());
    assert!(repository.granted_totals().await.unwrap().is_empty());

    stop(controller, repository).await;
}

#[tokio::test]
async fn test_resumed_countdown_applies_grant() {
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("bot.db");
    let timer = Duration::from_secs(1);

    let (controller, repository) = start(&db, timer).await;
    let voting = controller
        .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, args(40))
        .await
        .unwrap();
    stop(controller, repository).await;

    let (controller, repository) = start(&db, timer).await;
    controller.restore().await.unwrap();

    let mut waited = Duration::ZERO;
    while controller.is_active(voting).await && waited < Duration::from_secs(10) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    assert!(!controller.is_active(voting).await);
    assert_eq!(
        repository.granted_totals().await.unwrap(),
        vec![(BENEFICIARY, 40)]
    );
    assert!(repository.load_proposals().await.unwrap().is_empty());

    stop(controller, repository).await;
}

#[tokio::test]
async fn test_resolved_proposal_is_not_restored() {
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("bot.db");
    let timer = Duration::from_secs(3600);

    let (controller, repository) = start(&db, timer).await;
    let voting = controller
        .create(COMMAND_CHANNEL, MessageId(1), AUTHOR, args(100))
        .await
        .unwrap();
    controller.cancel_by_proposer(voting, AUTHOR).await.unwrap();
    stop(controller, repository).await;

    let (controller, repository) = start(&db, timer).await;
    assert_eq!(controller.restore().await.unwrap(), 0);
    assert!(!controller.is_active(voting).await);

    stop(controller, repository).await;
}
