//! [`SyncRpc`] over HTTP with JSON bodies.
//!
//! Routes, relative to the configured base url:
//!
//! ```text
//! GET  /api/crdt/checkConnection          -> 2xx when healthy
//! POST /api/crdt/{project}/add            <- { commits, clientId? }
//! GET  /api/crdt/{project}/get            -> SyncState
//! POST /api/crdt/{project}/changes        <- SyncState -> ChangesResult
//! ```

use async_trait::async_trait;
use lexsync_core::{ChangesResult, ClientId, Commit, SyncState};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::HttpSyncConfig;
use crate::error::{Result, SyncError};
use crate::rpc::SyncRpc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody<'a> {
    commits: &'a [Commit],
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<ClientId>,
}

/// HTTP client for one project on one server.
#[derive(Debug, Clone)]
pub struct HttpSyncRpc {
    client: reqwest::Client,
    config: HttpSyncConfig,
    base: String,
    authority: String,
}

impl HttpSyncRpc {
    pub fn new(config: HttpSyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, config)
    }

    /// Use a preconfigured client, e.g. one that attaches auth headers.
    pub fn with_client(client: reqwest::Client, config: HttpSyncConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.base_url).map_err(|e| {
            SyncError::InvalidArgument(format!("bad base url {}: {e}", config.base_url))
        })?;
        let host = url.host_str().ok_or_else(|| {
            SyncError::InvalidArgument(format!("base url {} has no host", config.base_url))
        })?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let base = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            config,
            base,
            authority,
        })
    }

    pub fn config(&self) -> &HttpSyncConfig {
        &self.config
    }

    fn project_url(&self, action: &str) -> String {
        format!("{}/api/crdt/{}/{}", self.base, self.config.project_id, action)
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            response = request.send() => Ok(response?),
        }
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
        cancel: &CancellationToken,
    ) -> Result<Option<T>> {
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            body = response.bytes() => body?,
        };
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl SyncRpc for HttpSyncRpc {
    fn authority(&self) -> &str {
        &self.authority
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<bool> {
        let url = format!("{}/api/crdt/checkConnection", self.base);
        let response = self.send(self.client.get(&url), cancel).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                authority = %self.authority,
                status = status.as_u16(),
                "health check failed"
            );
        }
        Ok(status.is_success())
    }

    async fn push_commits(
        &self,
        commits: &[Commit],
        client_id: Option<ClientId>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = self.project_url("add");
        let body = PushBody {
            commits,
            client_id: client_id.or(self.config.client_id),
        };
        let response = self.send(self.client.post(&url).json(&body), cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url,
            });
        }
        debug!(count = commits.len(), %url, "pushed commits");
        Ok(())
    }

    async fn pull_sync_state(&self, cancel: &CancellationToken) -> Result<SyncState> {
        let response = self.send(self.client.get(self.project_url("get")), cancel).await?;
        Self::read_json::<SyncState>(response, cancel)
            .await?
            .ok_or_else(|| SyncError::InvalidArgument("peer returned a null sync state".into()))
    }

    async fn pull_missing_commits(
        &self,
        local: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<ChangesResult> {
        let request = self.client.post(self.project_url("changes")).json(local);
        let response = self.send(request, cancel).await?;
        Self::read_json::<ChangesResult>(response, cancel)
            .await?
            .ok_or_else(|| SyncError::InvalidArgument("peer returned null changes".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_authority_includes_explicit_port() {
        let rpc = HttpSyncRpc::new(HttpSyncConfig::new("http://localhost:5137/", Uuid::nil())).unwrap();
        assert_eq!(rpc.authority(), "localhost:5137");

        let rpc = HttpSyncRpc::new(HttpSyncConfig::new("https://lex.example.org", Uuid::nil())).unwrap();
        assert_eq!(rpc.authority(), "lex.example.org");
    }

    #[test]
    fn test_project_urls() {
        let project = Uuid::from_u128(7);
        let rpc = HttpSyncRpc::new(HttpSyncConfig::new("http://host/", project)).unwrap();

        assert_eq!(
            rpc.project_url("changes"),
            format!("http://host/api/crdt/{project}/changes")
        );
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let result = HttpSyncRpc::new(HttpSyncConfig::new("not a url", Uuid::nil()));
        assert!(matches!(result, Err(SyncError::InvalidArgument(_))));
    }

    #[test]
    fn test_push_body_shape() {
        let client = ClientId::new_v4();
        let body = PushBody {
            commits: &[],
            client_id: Some(client),
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["commits"], serde_json::json!([]));
        assert_eq!(json["clientId"], client.to_string());
    }
}
