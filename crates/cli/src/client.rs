//! API client for the migration server's HTTP endpoints

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use server_lib::{ContainerStateSnapshot, HealthResponse, ReadinessResponse, SystemStateSnapshot};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
}

/// API client for the migration server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    ///
    /// Health endpoints answer 503 with a JSON body, so `accept_unavailable`
    /// lets callers decode those too.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, accept_unavailable: bool) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()).into());
        }
        if !status.is_success() && !(accept_unavailable && status == StatusCode::SERVICE_UNAVAILABLE) {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body }.into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn containers(&self) -> Result<Vec<ContainerStateSnapshot>> {
        self.get_json("api/v1/containers", false).await
    }

    pub async fn container(&self, container_id: &str) -> Result<ContainerStateSnapshot> {
        self.get_json(&format!("api/v1/containers/{}", container_id), false)
            .await
    }

    pub async fn system(&self) -> Result<SystemStateSnapshot> {
        self.get_json("api/v1/system", false).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("healthz", true).await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get_json("readyz", true).await
    }
}
