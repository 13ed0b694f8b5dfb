//! Grant proposals by lazy consensus.
//!
//! A proposal grants points to a member unless enough members object before
//! its countdown runs out.
//!
//! Flow: `propose` command -> [`LifecycleController::create`] -> voting
//! message + countdown. Opposing reactions go through
//! [`LifecycleController::register_oppose`]; the proposal resolves early at
//! the threshold, on the proposer's cancel, or when the countdown expires.

pub mod command;
pub mod countdown;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod messages;
pub mod proposal;
pub mod store;
pub mod voters;

#[cfg(test)]
mod proptests;

pub use command::{parse_command, parse_propose_args, Command, CommandError, ProposeArgs};
pub use countdown::{Countdown, CountdownOutcome};
pub use error::{GrantError, GrantResult};
pub use ledger::{GrantLedger, LedgerError, MemoryLedger};
pub use lifecycle::{GrantSettings, LifecycleController};
pub use proposal::{Proposal, ProposalResult, Voter};
pub use store::{Persist, ProposalStore, SharedStore};
