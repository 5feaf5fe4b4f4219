//! Proptest generators for property-based testing.

use proptest::prelude::*;
use uuid::Uuid;

use lexsync_core::{ClientId, Commit, CommitId, EntityId, HybridTimestamp, MultiString, SyncState};

/// Generate a random ClientId.
pub fn client_id() -> impl Strategy<Value = ClientId> {
    any::<u128>().prop_map(|n| ClientId::from_uuid(Uuid::from_u128(n)))
}

/// Generate a random CommitId.
pub fn commit_id() -> impl Strategy<Value = CommitId> {
    any::<u128>().prop_map(|n| CommitId::from_uuid(Uuid::from_u128(n)))
}

/// Generate a random EntityId.
pub fn entity_id() -> impl Strategy<Value = EntityId> {
    any::<u128>().prop_map(|n| EntityId::from_uuid(Uuid::from_u128(n)))
}

/// Generate a timestamp in a small window so collisions happen.
pub fn timestamp() -> impl Strategy<Value = HybridTimestamp> {
    (0i64..1_000, 0i64..4).prop_map(|(millis, counter)| HybridTimestamp::from_millis(millis, counter))
}

/// Generate a multi-string with up to three writing systems.
pub fn multi_string() -> impl Strategy<Value = MultiString> {
    prop::collection::btree_map(
        prop_oneof![Just("en".to_string()), Just("fr".to_string()), Just("de".to_string())],
        "[a-z]{1,8}",
        0..=3,
    )
    .prop_map(MultiString)
}

/// Generate an empty commit authored by one of `clients`.
pub fn commit_from(clients: Vec<ClientId>) -> impl Strategy<Value = Commit> {
    (commit_id(), prop::sample::select(clients), timestamp())
        .prop_map(|(id, client, ts)| Commit::with_id(id, client, ts))
}

/// Generate up to `max` commits from a pool of `authors` clients.
pub fn commit_set(authors: usize, max: usize) -> impl Strategy<Value = Vec<Commit>> {
    prop::collection::vec(client_id(), 1..=authors.max(1)).prop_flat_map(move |clients| {
        prop::collection::vec(commit_from(clients), 0..=max)
    })
}

/// Generate a sync state over arbitrary clients.
pub fn sync_state() -> impl Strategy<Value = SyncState> {
    prop::collection::btree_map(client_id(), 0i64..1_000, 0..5).prop_map(SyncState)
}
