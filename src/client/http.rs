//! HTTP client for the serverless endpoint API.

use crate::config::{Credentials, DEFAULT_API_URL};
use crate::error::RelayError;
use crate::protocol::{HealthReport, Job, RunRequest, RunResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::poll::PollPolicy;

/// Connect timeout for every request.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Accepted; poll this job id.
    Queued(String),
    /// The endpoint answered with the finished job right away.
    Finished(Job),
}

/// Client for one serverless endpoint.
///
/// Holds no job state; every call is independent.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    api_url: String,
    credentials: Credentials,
    pub(super) policy: PollPolicy,
}

impl RelayClient {
    /// Create a client against the public API.
    pub fn new(credentials: Credentials) -> Result<Self, RelayError> {
        Self::with_api_url(credentials, DEFAULT_API_URL)
    }

    /// Create a client against a custom base URL (an emulator, a proxy).
    ///
    /// Credentials are not checked here; every request checks them first.
    pub fn with_api_url(
        credentials: Credentials,
        api_url: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials,
            policy: PollPolicy::default(),
        })
    }

    /// Replace the poll policy. Values below the floors are raised to them.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy.clamped();
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.policy
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_url,
            self.credentials.endpoint_id.trim(),
            path
        )
    }

    /// Submit a job.
    ///
    /// Returns the job id to poll, or the finished job when the endpoint
    /// answered synchronously.
    pub async fn start(&self, input: Value) -> Result<Submission, RelayError> {
        self.credentials.validate()?;

        let url = self.endpoint_url("run");
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.api_key.trim())
            .json(&RunRequest { input })
            .timeout(self.policy.request_timeout)
            .send()
            .await?;

        let ack: RunResponse = self.handle_response(response).await?;
        if let Some(id) = ack.job_id() {
            info!(job_id = %id, status = ?ack.status, "Job submitted");
            return Ok(Submission::Queued(id.to_string()));
        }

        match ack.into_finished() {
            Some(job) => {
                info!(status = %job.status, "Endpoint answered synchronously");
                Ok(Submission::Finished(job))
            }
            None => Err(RelayError::InvalidResponse(
                "submission returned no job id".into(),
            )),
        }
    }

    /// Submit a job and return its id.
    pub async fn submit(&self, input: Value) -> Result<String, RelayError> {
        match self.start(input).await? {
            Submission::Queued(id) => Ok(id),
            Submission::Finished(job) => Err(RelayError::InvalidResponse(format!(
                "submission returned no job id (status {})",
                job.status
            ))),
        }
    }

    /// Read the current status of a job once.
    pub async fn status(&self, job_id: &str) -> Result<Job, RelayError> {
        self.status_within(job_id, self.policy.request_timeout).await
    }

    /// Read the status with an explicit per-request timeout.
    pub(super) async fn status_within(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<Job, RelayError> {
        self.credentials.validate()?;

        let url = self.endpoint_url(&format!("status/{job_id}"));
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.api_key.trim())
            .timeout(timeout)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Fetch the endpoint health report. Verifies credentials and reachability.
    pub async fn health(&self) -> Result<HealthReport, RelayError> {
        self.credentials.validate()?;

        let url = self.endpoint_url("health");
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.api_key.trim())
            .timeout(self.policy.request_timeout)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Submit a job and wait for it to reach a terminal status.
    pub async fn run(&self, input: Value, max_wait: Duration) -> Result<Job, RelayError> {
        match self.start(input).await? {
            Submission::Queued(job_id) => self.await_completion(&job_id, max_wait).await,
            Submission::Finished(job) => Ok(job),
        }
    }

    /// Handle API response, parsing JSON or classifying the error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RelayError> {
        if !response.status().is_success() {
            return Err(RelayError::from_response(response, &self.credentials.endpoint_id).await);
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            RelayError::InvalidResponse(e.to_string())
        })
    }
}
