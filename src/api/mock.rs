use super::ScanApi;
use crate::model::{HealthStatus, StatusPayload};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum PollScript {
    Payload(StatusPayload),
    Fail,
}

/// Scripted stand-in for the job server.
pub(crate) struct MockScanApi {
    run_id: Option<String>,
    submit_stalls: bool,
    polls: Mutex<VecDeque<PollScript>>,
    poll_delay: Option<Duration>,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl MockScanApi {
    /// Server that accepts every submission with `run_id`.
    pub fn accepting(run_id: &str) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            submit_stalls: false,
            polls: Mutex::new(VecDeque::new()),
            poll_delay: None,
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        }
    }

    /// Server that cannot be reached at all.
    pub fn unreachable() -> Self {
        Self {
            run_id: None,
            ..Self::accepting("")
        }
    }

    /// Server that accepts the connection but never answers a submission.
    pub fn stalled() -> Self {
        Self {
            submit_stalls: true,
            ..Self::accepting("")
        }
    }

    pub fn with_poll(self, payload: StatusPayload) -> Self {
        self.polls
            .lock()
            .unwrap()
            .push_back(PollScript::Payload(payload));
        self
    }

    pub fn with_poll_json(self, body: &str) -> Self {
        let payload: StatusPayload = serde_json::from_str(body).unwrap();
        self.with_poll(payload)
    }

    pub fn with_poll_failure(self) -> Self {
        self.polls.lock().unwrap().push_back(PollScript::Fail);
        self
    }

    /// Hold every poll response for `delay` before resolving.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanApi for MockScanApi {
    async fn submit(&self, _url: &str) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.submit_stalls {
            std::future::pending::<()>().await;
        }
        self.run_id
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }

    async fn poll(&self, _run_id: &str) -> Result<StatusPayload> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        match next {
            Some(PollScript::Payload(p)) => Ok(p),
            Some(PollScript::Fail) => Err(anyhow!("503 service unavailable")),
            None => Err(anyhow!("no scripted response")),
        }
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".into(),
            active_scans: 0,
        })
    }
}
