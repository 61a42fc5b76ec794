// REST API client module for Careline
// This file holds the backend traits and the shared client state;
// the individual endpoints live in their own submodules.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

pub mod history;
pub mod send;

pub use history::{HistoryResponse, PageInfo, RawMessage};

/// Request timeout applied to every history and send call. The server
/// side assistant can take a while to answer, so this is generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Typed failure for everything that crosses the network boundary.
/// Nothing above this layer sees a panic or a raw reqwest error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not obtain auth token: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("malformed server response: {0}")]
    Decode(String),
}

/// Supplies the bearer token stamped on every request. Injected into
/// the backend rather than read from a process-wide singleton.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn get_auth_token(&self) -> Result<String, ApiError>;
}

/// A provider for tokens that are known up front (CLI flag, env var, tests).
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: &str) -> Self {
        StaticTokenProvider { token: token.to_string() }
    }
}

#[async_trait]
impl AuthTokenProvider for StaticTokenProvider {
    async fn get_auth_token(&self) -> Result<String, ApiError> {
        if self.token.is_empty() {
            return Err(ApiError::Auth("no token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// The two remote operations the timeline engine needs. Kept as a trait
/// so tests can substitute a scripted backend for the HTTP client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Fetch one page of chat history, newest page first (page 0 holds
    /// the most recent messages).
    async fn fetch_history(&self, page: u32, page_size: u32) -> Result<HistoryResponse, ApiError>;

    /// Send one user message and return the assistant's raw text reply.
    async fn send_chat_message(&self, text: &str) -> Result<String, ApiError>;
}

/// HTTP implementation of [`ChatBackend`] against the chat service.
pub struct RestBackend {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthTokenProvider>,
}

impl RestBackend {
    pub fn new(base_url: &str, auth: Arc<dyn AuthTokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(RestBackend {
            http,
            // Endpoint paths are joined onto this, so strip a trailing slash once here
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub(crate) async fn bearer_token(&self) -> Result<String, ApiError> {
        let token = self.auth.get_auth_token().await?;
        Ok(format!("Bearer {}", token))
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatBackend for RestBackend {
    async fn fetch_history(&self, page: u32, page_size: u32) -> Result<HistoryResponse, ApiError> {
        self.fetch_history_page(page, page_size).await
    }

    async fn send_chat_message(&self, text: &str) -> Result<String, ApiError> {
        self.post_chat_message(text).await
    }
}

/// Collapse a reqwest error into the [`ApiError`] taxonomy. Timeouts
/// are just another transport failure.
pub(crate) fn classify_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        ApiError::Status(status.as_u16())
    } else {
        ApiError::Transport(err.to_string())
    }
}
