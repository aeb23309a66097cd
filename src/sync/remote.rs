//! Remote Sync Client - HTTP access to the shared collection store
//!
//! Stateless with respect to merge logic: `fetch` pulls the server's copy
//! of a collection, `push` replaces it and returns the server-merged
//! result. The server performs its own id+timestamp union on write, which
//! the client tolerates as a second merge point; the client-side merge
//! still runs first so local-only records are never clobbered.
//!
//! Records travel as raw JSON values; orchestrators own (de)serialization
//! so one client serves every collection type.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use async_trait::async_trait;

const API_BASE_URL: &str = "https://sync.dukkan.app/api/v1";

/// Every remote call is bounded so a hung request can never wedge an
/// orchestrator's in-flight flag.
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("unauthorized - login required")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid response from server")]
    InvalidResponse,
}

/// The remote collection store, as the orchestrators see it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Pull the server's copy of a collection. A collection the server has
    /// never seen is empty, not an error.
    async fn fetch(&self, key: &str) -> Result<Vec<Value>, RemoteError>;

    /// Replace the server's copy and receive the server-merged result.
    async fn push(&self, key: &str, records: &[Value]) -> Result<Vec<Value>, RemoteError>;
}

/// Production client for the Dukkan sync server.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    /// Bearer token (cached in memory, set after login)
    access_token: Arc<RwLock<Option<String>>>,
}

impl HttpRemoteStore {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Set access token (after login)
    pub async fn set_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Clear token (logout)
    pub async fn clear_token(&self) {
        let mut guard = self.access_token.write().await;
        *guard = None;
    }

    pub async fn get_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    fn collection_url(&self, key: &str) -> String {
        format!("{}/collections/{}", self.base_url, key)
    }
}

impl Default for HttpRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, key: &str) -> Result<Vec<Value>, RemoteError> {
        let mut request = self.client.get(self.collection_url(key));
        if let Some(token) = self.get_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_request_error)?;

        // 404 means the server has never seen this collection (first sync)
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        handle_response(response).await
    }

    async fn push(&self, key: &str, records: &[Value]) -> Result<Vec<Value>, RemoteError> {
        let mut request = self.client.put(self.collection_url(key)).json(records);
        if let Some(token) = self.get_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_request_error)?;
        handle_response(response).await
    }
}

fn map_request_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Request(e.to_string())
    }
}

/// Decode a successful collection body, mapping error statuses first.
async fn handle_response(response: reqwest::Response) -> Result<Vec<Value>, RemoteError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<Vec<Value>>()
            .await
            .map_err(|_| RemoteError::InvalidResponse);
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        _ if status.is_server_error() => {
            let msg = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            RemoteError::Server(format!("{}: {}", status, msg))
        }
        _ => {
            let msg = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            RemoteError::Request(format!("{}: {}", status, msg))
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
