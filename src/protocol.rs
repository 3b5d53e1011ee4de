//! Wire types for the serverless endpoint API.
//!
//! The platform speaks JSON over HTTPS. A job is submitted as an envelope
//! around the caller input and observed through a status document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Submission envelope sent to `POST /{endpoint_id}/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Caller input handed verbatim to the remote handler.
    pub input: Value,
}

impl RunRequest {
    /// Build an envelope for a text prompt plus optional extra parameters.
    ///
    /// Parameters never override the prompt itself.
    pub fn prompt(prompt: impl Into<String>, params: Map<String, Value>) -> Self {
        let mut input = params;
        input.insert("prompt".to_string(), Value::String(prompt.into()));
        Self {
            input: Value::Object(input),
        }
    }
}

/// Remote job status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for a worker.
    InQueue,
    /// A worker is running the handler.
    InProgress,
    /// Handler returned successfully.
    Completed,
    /// Handler raised an error.
    Failed,
    /// Platform-side execution limit reached.
    TimedOut,
    /// Cancelled on the platform.
    Cancelled,
    /// Any status string this client does not know.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InQueue => write!(f, "IN_QUEUE"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Status document for one job, returned by both `/run` and `/status/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Platform-assigned job id.
    pub id: String,
    /// Current status.
    pub status: JobStatus,
    /// Handler output, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error description, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent queued, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_time: Option<u64>,
    /// Time spent executing, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
}

impl Job {
    /// A freshly queued job.
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::InQueue,
            output: None,
            error: None,
            delay_time: None,
            execution_time: None,
        }
    }

    /// Convert a terminal job into its output.
    ///
    /// Jobs that ended in any terminal status other than completed become
    /// [`RelayError::JobFailed`](crate::error::RelayError::JobFailed).
    pub fn into_output(self) -> Result<Value, crate::error::RelayError> {
        match self.status {
            JobStatus::Completed => Ok(self.output.unwrap_or(Value::Null)),
            status => Err(crate::error::RelayError::JobFailed {
                job_id: self.id,
                status,
                error: self.error,
            }),
        }
    }
}

/// Submission acknowledgement.
///
/// Usually just an id and `IN_QUEUE`. Some deployments answer synchronously
/// instead: no id, a terminal status and the output inline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub delay_time: Option<u64>,
    #[serde(default)]
    pub execution_time: Option<u64>,
}

impl RunResponse {
    /// The job id to poll, if the platform assigned one.
    pub fn job_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// The finished job carried by a synchronous answer.
    pub fn into_finished(self) -> Option<Job> {
        let status = self.status.filter(JobStatus::is_terminal)?;
        Some(Job {
            id: self.id.unwrap_or_default(),
            status,
            output: self.output,
            error: self.error,
            delay_time: self.delay_time,
            execution_time: self.execution_time,
        })
    }
}

/// Endpoint health as reported by `GET /{endpoint_id}/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub jobs: JobCounters,
    #[serde(default)]
    pub workers: WorkerCounters,
}

/// Job counters for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub in_queue: u64,
    #[serde(default)]
    pub retried: u64,
}

/// Worker counters for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCounters {
    #[serde(default)]
    pub idle: u64,
    #[serde(default)]
    pub running: u64,
}

/// Error body returned by the emulator and, loosely, by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_envelope() {
        let mut params = Map::new();
        params.insert("max_tokens".to_string(), json!(64));
        params.insert("prompt".to_string(), json!("ignored"));

        let req = RunRequest::prompt("Hello GPU!", params);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "input": { "prompt": "Hello GPU!", "max_tokens": 64 } })
        );
    }

    #[test]
    fn test_status_parsing() {
        let job: Job = serde_json::from_value(json!({
            "id": "abc-123",
            "status": "COMPLETED",
            "output": "world",
            "delayTime": 812,
            "executionTime": 40
        }))
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.output, Some(json!("world")));
        assert_eq!(job.delay_time, Some(812));
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let job: Job =
            serde_json::from_value(json!({ "id": "x", "status": "THROTTLED" })).unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::InQueue.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_into_output_failed() {
        let mut job = Job::queued("job-1");
        job.status = JobStatus::Failed;
        job.error = Some("CUDA out of memory".to_string());

        let err = job.into_output().unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));
    }

    #[test]
    fn test_run_response_synchronous_answer() {
        let ack: RunResponse = serde_json::from_value(json!({
            "status": "COMPLETED",
            "output": "inline",
            "executionTime": 7
        }))
        .unwrap();
        assert_eq!(ack.job_id(), None);

        let job = ack.into_finished().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.execution_time, Some(7));
        assert_eq!(job.into_output().unwrap(), json!("inline"));

        let queued: RunResponse =
            serde_json::from_value(json!({ "id": "", "status": "IN_QUEUE" })).unwrap();
        assert_eq!(queued.job_id(), None);
        assert!(queued.into_finished().is_none());
    }

    #[test]
    fn test_health_defaults() {
        let report: HealthReport =
            serde_json::from_value(json!({ "workers": { "idle": 2 } })).unwrap();
        assert_eq!(report.workers.idle, 2);
        assert_eq!(report.jobs, JobCounters::default());
    }
}
