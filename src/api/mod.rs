//! Boundary with the remote job server.
//!
//! The controller only ever talks to the server through [`ScanApi`], so tests can swap the
//! HTTP client for a scripted double.

mod http;
#[cfg(test)]
pub(crate) mod mock;

use crate::model::{HealthStatus, StatusPayload};
use anyhow::Result;
use async_trait::async_trait;

pub(crate) use http::HttpScanApi;

#[async_trait]
pub(crate) trait ScanApi: Send + Sync + 'static {
    /// Start a scan of `url`, returning the server-assigned run id.
    async fn submit(&self, url: &str) -> Result<String>;

    /// Fetch the current partial snapshot for `run_id`.
    async fn poll(&self, run_id: &str) -> Result<StatusPayload>;

    async fn health(&self) -> Result<HealthStatus>;
}
