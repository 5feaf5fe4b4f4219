//! Cached peer health.
//!
//! A peer is checked at most once per TTL. Failures are cached too, so an
//! unreachable server is not hammered on every sync attempt.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};

use crate::error::SyncError;
use crate::rpc::SyncRpc;

/// How long a health result is trusted.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(30 * 60);

/// Health results keyed by peer authority.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (bool, Instant)>>,
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_HEALTH_TTL)
    }
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(authority: &str) -> String {
        format!("ServerHealth|{authority}")
    }

    /// The cached result for `authority`, if still fresh.
    pub fn cached(&self, authority: &str) -> Option<bool> {
        let entries = self.entries.lock();
        entries
            .get(&Self::key(authority))
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(healthy, _)| *healthy)
    }

    pub fn record(&self, authority: &str, healthy: bool) {
        self.entries
            .lock()
            .insert(Self::key(authority), (healthy, Instant::now()));
    }

    /// Forget every cached result.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Whether `rpc` is healthy, asking it only on a cache miss.
    ///
    /// Never fails: transport errors count as unhealthy. A cancelled check
    /// reports unhealthy for this attempt but is not cached.
    pub async fn is_healthy(&self, rpc: &dyn SyncRpc, cancel: &CancellationToken) -> bool {
        let authority = rpc.authority();
        if let Some(healthy) = self.cached(authority) {
            return healthy;
        }

        let healthy = match rpc.health_check(cancel).await {
            Ok(healthy) => healthy,
            Err(SyncError::Cancelled) => {
                debug!(authority, "health check cancelled");
                return false;
            }
            Err(e) => {
                if tracing::enabled!(Level::DEBUG) {
                    debug!(authority, error = %e, "health check failed");
                } else {
                    warn!(authority, "health check failed");
                }
                false
            }
        };
        self.record(authority, healthy);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use lexsync_core::{ChangesResult, ClientId, Commit, SyncState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Peer {
        answer: Option<bool>,
        calls: AtomicUsize,
    }

    impl Peer {
        fn new(answer: Option<bool>) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SyncRpc for Peer {
        fn authority(&self) -> &str {
            "peer:1"
        }

        async fn health_check(&self, cancel: &CancellationToken) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.answer
                .ok_or_else(|| SyncError::InvalidArgument("unreachable".into()))
        }

        async fn push_commits(
            &self,
            _commits: &[Commit],
            _client_id: Option<ClientId>,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            Ok(())
        }

        async fn pull_sync_state(&self, _cancel: &CancellationToken) -> Result<SyncState> {
            Ok(SyncState::new())
        }

        async fn pull_missing_commits(
            &self,
            _local: &SyncState,
            _cancel: &CancellationToken,
        ) -> Result<ChangesResult> {
            Ok(ChangesResult::empty())
        }
    }

    #[tokio::test]
    async fn test_healthy_result_is_cached() {
        let cache = HealthCache::new();
        let peer = Peer::new(Some(true));
        let cancel = CancellationToken::new();

        assert!(cache.is_healthy(&peer, &cancel).await);
        assert!(cache.is_healthy(&peer, &cancel).await);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached_as_unhealthy() {
        let cache = HealthCache::new();
        let peer = Peer::new(None);
        let cancel = CancellationToken::new();

        assert!(!cache.is_healthy(&peer, &cancel).await);
        assert!(!cache.is_healthy(&peer, &cancel).await);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached("peer:1"), Some(false));
    }

    #[tokio::test]
    async fn test_cancelled_check_is_not_cached() {
        let cache = HealthCache::new();
        let peer = Peer::new(Some(true));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!cache.is_healthy(&peer, &cancel).await);
        assert_eq!(cache.cached("peer:1"), None);

        // The next attempt asks the peer again.
        assert!(cache.is_healthy(&peer, &CancellationToken::new()).await);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.cached("peer:1"), Some(true));
    }

    #[tokio::test]
    async fn test_expired_entry_is_rechecked() {
        let cache = HealthCache::with_ttl(Duration::ZERO);
        let peer = Peer::new(Some(false));
        let cancel = CancellationToken::new();

        assert!(!cache.is_healthy(&peer, &cancel).await);
        assert!(!cache.is_healthy(&peer, &cancel).await);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_entries_are_per_authority() {
        let cache = HealthCache::new();
        cache.record("a:1", true);

        assert_eq!(cache.cached("a:1"), Some(true));
        assert_eq!(cache.cached("b:1"), None);

        cache.clear();
        assert_eq!(cache.cached("a:1"), None);
    }
}
