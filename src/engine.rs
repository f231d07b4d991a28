use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::AppError;

/// Engine status id for a correct run (Judge0 convention).
pub const STATUS_ACCEPTED: u32 = 3;

const DEFAULT_WAIT_TIMEOUT: u64 = 30;

/// One request unit: a submission's code paired with a single test case.
#[derive(Serialize, Debug, Clone)]
pub struct BatchItem {
    pub language_id: u32,
    pub source_code: String,
    pub stdin: String,
    pub expected_output: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerdictStatus {
    pub id: u32,
    pub description: String,
}

/// Engine-side result of one batch item. Individual statuses are not
/// interpreted here; reducing them to a submission verdict is the worker's
/// job.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    /// Wall time in seconds, encoded by the engine as a decimal string
    pub time: Option<String>,
    /// Peak memory in KB
    pub memory: Option<i64>,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.status.id == STATUS_ACCEPTED
    }

    pub fn time_seconds(&self) -> Option<f64> {
        self.time.as_deref().and_then(|t| t.parse().ok())
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    submissions: &'a [BatchItem],
}

#[derive(Deserialize)]
struct BatchResponse {
    submissions: Vec<Verdict>,
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submits all items in one call and blocks until the engine has run
    /// every one of them. Returns one verdict per item, in item order.
    async fn execute_batch(&self, items: &[BatchItem]) -> Result<Vec<Verdict>, AppError>;
}

/// HTTP client for a Judge0-compatible batch endpoint.
///
/// Per-item round trips would dominate latency on problems with many test
/// cases, so the whole batch goes out in one `wait=true` call bounded by
/// `wait_timeout`. There is no client-side polling loop.
pub struct HttpEngine {
    client: reqwest::Client,
    config: EngineConfig,
}

impl HttpEngine {
    pub fn new(config: EngineConfig) -> Result<Self, AppError> {
        let timeout = config.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| AppError::Engine(format!("failed to build http client: {e}")))?;

        Ok(Self { client, config })
    }

    fn batch_url(&self) -> String {
        format!(
            "{}/submissions/batch?base64_encoded=false&wait=true",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn execute_batch(&self, items: &[BatchItem]) -> Result<Vec<Verdict>, AppError> {
        log::debug!("Sending batch of {} items to execution engine", items.len());

        let mut request = self
            .client
            .post(self.batch_url())
            .json(&BatchRequest { submissions: items });
        if let Some(key) = &self.config.api_key {
            request = request.header("X-RapidAPI-Key", key);
        }
        if let Some(host) = &self.config.api_host {
            request = request.header("X-RapidAPI-Host", host);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Engine(format!("batch request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Engine(format!("engine returned {status}")));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Engine(format!("malformed engine response: {e}")))?;

        if body.submissions.len() != items.len() {
            return Err(AppError::Engine(format!(
                "engine returned {} verdicts for {} items",
                body.submissions.len(),
                items.len()
            )));
        }

        Ok(body.submissions)
    }
}
