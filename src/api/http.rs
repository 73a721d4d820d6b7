use super::ScanApi;
use crate::model::{HealthStatus, RunConfig, StatusPayload, SubmitRequest, SubmitResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// JSON-over-HTTP client for the scan job server.
pub(crate) struct HttpScanApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScanApi {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        // No per-request timeout: a hung poll only delays its own tick.
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn submit(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/attack"))
            .json(&SubmitRequest { url })
            .send()
            .await
            .context("submit request failed")?
            .error_for_status()
            .context("submit rejected")?;
        let body: SubmitResponse = resp.json().await.context("decode submit response")?;
        Ok(body.run_id)
    }

    async fn poll(&self, run_id: &str) -> Result<StatusPayload> {
        let resp = self
            .http
            .get(self.url(&format!("/status/{run_id}")))
            .send()
            .await
            .context("status request failed")?
            .error_for_status()
            .context("status rejected")?;
        resp.json().await.context("decode status response")
    }

    async fn health(&self) -> Result<HealthStatus> {
        let resp = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .context("health request failed")?
            .error_for_status()
            .context("health check rejected")?;
        resp.json().await.context("decode health response")
    }
}
