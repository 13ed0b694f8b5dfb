//! Property-based tests for the voter registry
//!
//! Tests for:
//! - Vote toggling: count equals the number of distinct users currently opposing
//! - Write-through: repository voter rows match the in-memory set

use super::proposal::fixtures::proposal;
use super::proposal::Voter;
use super::store::{Persist, ProposalStore};
use crate::chat::{MessageId, UserId};
use crate::persistence::MemoryGrantRepository;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Property: any sequence of add/retract leaves exactly the distinct
    /// users whose last action was "add"
    #[test]
    fn vote_count_matches_distinct_opposers(
        ops in prop::collection::vec((1u64..8, any::<bool>()), 0..64),
    ) {
        let (count, rows, expected) = runtime().block_on(async move {
            let repo = Arc::new(MemoryGrantRepository::new());
            let mut store = ProposalStore::new(repo.clone());
            store.add(proposal(10), Persist::Durable).await.unwrap();

            let mut expected = HashSet::new();
            for (user, add) in ops {
                if add {
                    store.add_vote(Voter::new(UserId(user), MessageId(10))).await.unwrap();
                    expected.insert(user);
                } else {
                    store.remove_vote(UserId(user), MessageId(10)).await.unwrap();
                    expected.remove(&user);
                }
            }

            let count = store.vote_count(MessageId(10)).unwrap();
            (count, repo.voter_count(), expected.len())
        });

        prop_assert_eq!(count, expected);
        prop_assert_eq!(rows, expected, "repository must mirror the in-memory voter set");
    }

    /// Property: the same user voting repeatedly counts once
    #[test]
    fn repeated_votes_count_once(user in 1u64..1000, repeats in 1usize..10) {
        let count = runtime().block_on(async {
            let mut store = ProposalStore::new(Arc::new(MemoryGrantRepository::new()));
            store.add(proposal(10), Persist::Durable).await.unwrap();
            for _ in 0..repeats {
                store.add_vote(Voter::new(UserId(user), MessageId(10))).await.unwrap();
            }
            store.vote_count(MessageId(10)).unwrap()
        });

        prop_assert_eq!(count, 1);
    }
}
