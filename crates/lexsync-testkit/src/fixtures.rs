//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use lexsync_core::change::{
    CreateEntryChange, CreatePartOfSpeechChange, CreateSemanticDomainChange, CreateSenseChange,
    DeleteChange,
};
use lexsync_core::{
    link_chain, sort_commits, Change, ClientId, Commit, EntityId, HybridClock, HybridTimestamp,
    ManualTimeSource, MultiString,
};
use lexsync_store::{CommitStore, MemoryStore};

/// One authoring client with a scripted clock.
pub struct Author {
    pub client_id: ClientId,
    source: Arc<ManualTimeSource>,
    clock: HybridClock<Arc<ManualTimeSource>>,
}

impl Author {
    /// Create an author whose clock reads `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        let source = Arc::new(ManualTimeSource::at_millis(start_millis));
        Self {
            client_id: ClientId::new_v4(),
            clock: HybridClock::new(Arc::clone(&source)),
            source,
        }
    }

    /// The time source, for handing to a replica.
    pub fn source(&self) -> Arc<ManualTimeSource> {
        Arc::clone(&self.source)
    }

    pub fn clock(&self) -> &HybridClock<Arc<ManualTimeSource>> {
        &self.clock
    }

    /// Move the wall clock to `millis`.
    pub fn set_time(&self, millis: i64) {
        self.source.set_millis(millis);
    }

    /// A commit stamped by this author's clock.
    pub fn commit(&self, changes: Vec<Change>) -> Commit {
        Commit::new(self.client_id, self.clock.get_timestamp()).with_changes(changes)
    }

    /// A commit at an exact wall clock, bypassing the clock.
    pub fn commit_at(&self, millis: i64, changes: Vec<Change>) -> Commit {
        Commit::new(self.client_id, HybridTimestamp::from_millis(millis, 0)).with_changes(changes)
    }
}

/// Create several authors sharing a start time.
pub fn authors(count: usize, start_millis: i64) -> Vec<Author> {
    (0..count).map(|_| Author::new(start_millis)).collect()
}

/// Sort commits into log order and link them from the empty hash.
pub fn linked(mut commits: Vec<Commit>) -> Vec<Commit> {
    sort_commits(&mut commits);
    // Linking from the empty hash cannot fail.
    let _ = link_chain(&mut commits, "");
    commits
}

/// A memory store holding `commits`.
pub async fn seeded_store(commits: &[Commit]) -> MemoryStore {
    let store = MemoryStore::default();
    store
        .add_commits(commits)
        .await
        .unwrap_or_else(|e| panic!("seeding memory store failed: {e}"));
    store
}

// ─────────────────────────────────────────────────────────────────────────────
// Change helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn create_entry(id: EntityId, headword: &str) -> Change {
    Change::CreateEntry(CreateEntryChange::new(id).with_lexeme_form("en", headword))
}

pub fn create_sense(id: EntityId, entry: EntityId, gloss: &str) -> Change {
    Change::CreateSense(CreateSenseChange::new(id, entry).with_gloss("en", gloss))
}

pub fn create_part_of_speech(id: EntityId, name: &str) -> Change {
    Change::CreatePartOfSpeech(CreatePartOfSpeechChange::new(
        id,
        MultiString::new().with("en", name),
    ))
}

pub fn create_semantic_domain(id: EntityId, name: &str, code: &str) -> Change {
    Change::CreateSemanticDomain(CreateSemanticDomainChange::new(
        id,
        MultiString::new().with("en", name),
        code,
    ))
}

pub fn delete(id: EntityId) -> Change {
    Change::Delete(DeleteChange::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_core::validate_commits;

    #[test]
    fn test_author_commits_are_increasing() {
        let author = Author::new(1_000);
        let a = author.commit(vec![]);
        let b = author.commit(vec![]);

        assert!(a.timestamp < b.timestamp);
        assert_eq!(a.client_id, author.client_id);
    }

    #[test]
    fn test_linked_commits_validate() {
        let author = Author::new(0);
        let commits = linked(vec![
            author.commit_at(30, vec![]),
            author.commit_at(10, vec![]),
            author.commit_at(20, vec![]),
        ]);

        validate_commits(&commits).unwrap();
        assert_eq!(commits[0].timestamp.wall_millis(), 10);
    }

    #[tokio::test]
    async fn test_seeded_store_holds_commits() {
        let author = Author::new(0);
        let commits = vec![author.commit(vec![create_entry(EntityId::new_v4(), "apple")])];
        let store = seeded_store(&commits).await;

        assert_eq!(store.current_commits().await.unwrap(), commits);
    }
}
