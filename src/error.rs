//! Error kinds surfaced by the relay client.

use crate::protocol::JobStatus;
use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while relaying a job.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Credentials missing, left at their placeholders, or otherwise unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The platform rejected the API key.
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// The endpoint (or job) id is not known to the platform.
    #[error("endpoint not found: {endpoint_id}")]
    NotFound { endpoint_id: String, message: String },

    /// The request could not complete.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local wait bound exceeded. The remote job may still finish.
    #[error("timed out after {waited_secs}s waiting for job {job_id} (last status: {last_status})")]
    Timeout {
        job_id: String,
        last_status: JobStatus,
        waited_secs: u64,
    },

    /// Any other non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The platform answered with a body this client cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The job reached a terminal status other than completed.
    #[error("job {job_id} ended with status {status}{}", detail(.error))]
    JobFailed {
        job_id: String,
        status: JobStatus,
        error: Option<String>,
    },
}

fn detail(error: &Option<String>) -> String {
    error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
}

impl RelayError {
    /// Classify a non-success response.
    pub(crate) async fn from_response(response: reqwest::Response, endpoint_id: &str) -> Self {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication {
                status: status.as_u16(),
                message,
            },
            StatusCode::NOT_FOUND => Self::NotFound {
                endpoint_id: endpoint_id.to_string(),
                message,
            },
            _ => Self::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether a status poll that hit this error should simply be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::InvalidResponse(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// What the user can do about it.
    pub fn remedy(&self) -> &'static str {
        match self {
            Self::Configuration(_) => {
                "Set RUNPOD_API_KEY and RUNPOD_ENDPOINT_ID, pass --api-key/--endpoint-id, \
                 or edit the config file with `gpu-bridge config`. \
                 API keys live at https://www.runpod.io/console/user/settings"
            }
            Self::Authentication { .. } => {
                "Check that your API key is correct and has not been revoked."
            }
            Self::NotFound { .. } => {
                "Check the endpoint id and make sure the endpoint is deployed and active."
            }
            Self::Transport(_) => "Verify your internet connection and the API URL.",
            Self::Timeout { .. } => {
                "The job may still finish remotely. Retry with a larger --wait \
                 (cold starts can take a while)."
            }
            Self::Api { .. } | Self::InvalidResponse(_) => {
                "The platform returned an unexpected response. Try again shortly."
            }
            Self::JobFailed { .. } => "Check the handler logs of your endpoint.",
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Authentication { .. } => 3,
            Self::NotFound { .. } => 4,
            Self::Transport(_) => 5,
            Self::Timeout { .. } => 6,
            Self::JobFailed { .. } => 7,
            Self::Api { .. } | Self::InvalidResponse(_) => 1,
        }
    }
}
