//! API client for communicating with the warden daemon

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// HTTP client for the daemon API
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

    /// GET a JSON response
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET a plain-text response
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.text().await.context("Failed to read response")
    }

    /// POST a JSON body, expecting a JSON response
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// POST with an empty body, caring only about success
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        Ok(())
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub owner_id: u64,
    pub privileged: bool,
    pub max_run_time_ms: f64,
    pub max_run_time_avg_ms: f64,
    pub max_combined_run_time_ms: f64,
    pub max_combined_avg_ms: f64,
    pub max_offenses: u32,
    pub punishment: String,
    pub graceful_shutdown_delay_secs: u64,
    pub startup_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRuntimes {
    pub unit_id: u64,
    pub unit_name: String,
    pub grid_name: String,
    pub node_id: u64,
    pub last_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub offenses: u32,
    pub recompiles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub enabled: bool,
    pub node_id: u64,
    pub owners_tracked: usize,
    pub units_tracked: usize,
    pub cluster_enabled: bool,
    pub peers_known: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOverrideRequest {
    pub owner_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub pushed: bool,
}
