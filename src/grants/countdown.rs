//! Per-proposal countdown.
//!
//! Wakes every poll interval, writes the remaining time through to the store,
//! and hands over to the expiry callback once the time is used up. A proposal
//! that is no longer in the store was resolved early; the countdown then ends
//! without calling back. The shutdown channel stops the countdown and leaves
//! the proposal persisted for the next start.

use super::store::SharedStore;
use crate::chat::MessageId;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How a countdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Time ran out and the expiry callback ran
    Expired,
    /// The proposal was resolved before time ran out
    Cancelled,
    /// Process shutdown
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    voting_message_id: MessageId,
    remaining: Duration,
    poll_interval: Duration,
}

impl Countdown {
    pub fn new(voting_message_id: MessageId, remaining: Duration, poll_interval: Duration) -> Self {
        Self {
            voting_message_id,
            remaining,
            poll_interval,
        }
    }

    pub async fn run<F, Fut>(
        mut self,
        store: SharedStore,
        mut shutdown: watch::Receiver<bool>,
        on_expire: F,
    ) -> CountdownOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let id = self.voting_message_id;

        while !self.remaining.is_zero() {
            if *shutdown.borrow() {
                return CountdownOutcome::Stopped;
            }

            // Never sleep past the deadline when the poll interval is coarse
            let step = self.poll_interval.min(self.remaining);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = shutdown.changed() => {
                    debug!(voting_message_id = %id, "countdown stopped");
                    return CountdownOutcome::Stopped;
                }
            }
            self.remaining = self.remaining.saturating_sub(step);

            let mut guard = store.lock().await;
            if !guard.contains(id) {
                debug!(voting_message_id = %id, "proposal resolved early, countdown ends");
                return CountdownOutcome::Cancelled;
            }
            if !self.remaining.is_zero() {
                // Round up so a restart never shortens the countdown
                let secs = self.remaining.as_secs() + u64::from(self.remaining.subsec_nanos() > 0);
                if let Err(e) = guard.set_remaining(id, secs).await {
                    warn!(voting_message_id = %id, error = %e, "failed to persist remaining time");
                }
            }
        }

        if !store.lock().await.contains(id) {
            return CountdownOutcome::Cancelled;
        }
        on_expire().await;
        CountdownOutcome::Expired
    }
}
