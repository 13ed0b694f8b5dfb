//! Durable storage for grant proposals.
//!
//! The in-memory proposal index is write-through over a [`GrantRepository`]:
//! every add/remove of a proposal or voter hits the repository first.

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryGrantRepository;
pub use repository::{GrantRepository, RepositoryError, RepositoryResult};
pub use sqlite::SqliteGrantRepository;
