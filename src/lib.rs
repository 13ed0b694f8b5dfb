//! Lazy Consensus - grant points unless enough members object
//!
//! A chat bot where a member proposes a points grant for someone else. The
//! grant goes through when its countdown ends, unless enough members with a
//! voting role oppose it first.
//!
//! Key principles:
//! - Approval by default, opposition must be active
//! - Every proposal and vote is written through to SQLite before it counts
//! - A restart resumes every countdown from its remaining time
//! - The chat platform stays behind a trait (Discord in production, mock in tests)

pub mod bot;
pub mod chat;
pub mod grants;
pub mod persistence;
