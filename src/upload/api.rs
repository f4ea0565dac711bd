//! HTTP client for the collection server

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use waymesh_shared::{BatchResponse, LocationBatch, PositionReport, RelayBatch};

/// API client errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Connection settings for the collection server
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL including the API prefix, without a trailing slash
    pub base_url: String,
    /// Bearer credential issued by the auth layer
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".into(),
            token: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The server operations the tracker calls
#[async_trait]
pub trait LocationApi: Send + Sync {
    /// `POST /locations` with a sample batch
    async fn upload_locations(&self, batch: &LocationBatch) -> Result<BatchResponse, ApiError>;

    /// `POST /positions` with the live position
    async fn post_position(&self, report: &PositionReport) -> Result<(), ApiError>;

    /// `POST /positions/relay` with cached peer positions
    async fn post_relay(&self, batch: &RelayBatch) -> Result<(), ApiError>;
}

/// reqwest-backed client
pub struct HttpApi {
    http: reqwest::Client,
    cfg: ApiConfig,
}

impl HttpApi {
    /// Build a client with the configured timeout
    pub fn new(cfg: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            http,
            cfg: ApiConfig {
                base_url: cfg.base_url.trim_end_matches('/').to_string(),
                ..cfg
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base_url, path)
    }
}

#[async_trait]
impl LocationApi for HttpApi {
    async fn upload_locations(&self, batch: &LocationBatch) -> Result<BatchResponse, ApiError> {
        let resp = self
            .http
            .post(self.url("/locations"))
            .bearer_auth(&self.cfg.token)
            .json(batch)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    async fn post_position(&self, report: &PositionReport) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("/positions"))
            .bearer_auth(&self.cfg.token)
            .json(report)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        Ok(())
    }

    async fn post_relay(&self, batch: &RelayBatch) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("/positions/relay"))
            .bearer_auth(&self.cfg.token)
            .json(batch)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        Ok(())
    }
}
