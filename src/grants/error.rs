//! Proposal system errors.

use super::command::CommandError;
use crate::chat::{ChatError, MessageId};
use crate::persistence::RepositoryError;

/// Result type for proposal operations
pub type GrantResult<T> = Result<T, GrantError>;

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    /// A proposal field is malformed
    #[error("Invalid proposal: {0}")]
    Validation(String),

    /// A `propose` command failed validation; the message is user-facing
    #[error("{0}")]
    InvalidCommand(#[from] CommandError),

    /// No active proposal with this voting message id
    #[error("Proposal not found: {0}")]
    NotFound(MessageId),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    /// The proposal was resolved before this request got the store lock
    #[error("Proposal already resolved: {0}")]
    Resolved(MessageId),
}
