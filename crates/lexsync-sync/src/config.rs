//! Sync configuration.

use std::time::Duration;

use lexsync_core::ClientId;
use uuid::Uuid;

/// Default per-request timeout for HTTP RPCs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of commits per push.
pub const DEFAULT_PUSH_BATCH_SIZE: usize = 100;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum commits per push request.
    pub push_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_batch_size: DEFAULT_PUSH_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }
}

/// Where and as whom an [`HttpSyncRpc`](crate::HttpSyncRpc) talks.
#[derive(Debug, Clone)]
pub struct HttpSyncConfig {
    /// Server root, e.g. `https://lexbox.example.org`.
    pub base_url: String,
    /// The project whose log is synced.
    pub project_id: Uuid,
    /// Sent with pushes as the originating client.
    pub client_id: Option<ClientId>,
    pub request_timeout: Duration,
}

impl HttpSyncConfig {
    pub fn new(base_url: impl Into<String>, project_id: Uuid) -> Self {
        Self {
            base_url: base_url.into(),
            project_id,
            client_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
