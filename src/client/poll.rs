//! Bounded status polling.
//!
//! The loop always issues at least one status query, sleeps a fixed interval
//! between queries, and never sleeps past the deadline. The last query is
//! issued at the deadline, and each query is itself bounded, so a caller
//! waits at most `max_wait` plus roughly one interval.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::http::RelayClient;
use crate::error::RelayError;
use crate::protocol::{Job, JobStatus};

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shortest delay allowed between status queries.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest bound allowed for a single HTTP request.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing knobs for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between two status queries.
    pub interval: Duration,
    /// Upper bound for any single request.
    pub request_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PollPolicy {
    /// Raise both values to their floors. A zero interval would turn the
    /// loop into back-to-back requests.
    pub fn clamped(self) -> Self {
        Self {
            interval: self.interval.max(MIN_POLL_INTERVAL),
            request_timeout: self.request_timeout.max(MIN_REQUEST_TIMEOUT),
        }
    }

    /// Timeout for a status query issued with `remaining` time left.
    ///
    /// Never more than the request timeout; never less than one interval so
    /// a query at the deadline still has a chance to land.
    fn query_timeout(&self, remaining: Duration) -> Duration {
        remaining.max(self.interval).min(self.request_timeout)
    }
}

/// One observation made by the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollTick<'a> {
    /// 1-based number of the status query.
    pub attempt: u32,
    /// Time since polling started.
    pub elapsed: Duration,
    /// The bound the caller asked for.
    pub max_wait: Duration,
    /// The job as last seen, or `None` if this query failed transiently.
    pub job: Option<&'a Job>,
}

impl RelayClient {
    /// Poll until the job reaches a terminal status or `max_wait` elapses.
    pub async fn await_completion(
        &self,
        job_id: &str,
        max_wait: Duration,
    ) -> Result<Job, RelayError> {
        self.await_completion_with(job_id, max_wait, |_| {}).await
    }

    /// Like [`await_completion`](Self::await_completion), reporting every
    /// observation to `observer`.
    pub async fn await_completion_with<F>(
        &self,
        job_id: &str,
        max_wait: Duration,
        mut observer: F,
    ) -> Result<Job, RelayError>
    where
        F: FnMut(&PollTick<'_>),
    {
        info!(job_id = %job_id, max_wait_secs = max_wait.as_secs(), "Waiting for job");

        let start = Instant::now();
        // `None` when `max_wait` is too large to represent: wait without bound.
        let deadline = start.checked_add(max_wait);
        let mut last_status = JobStatus::InQueue;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let remaining = remaining_until(deadline);
            let timeout = self.policy.query_timeout(remaining);

            match self.status_within(job_id, timeout).await {
                Ok(job) => {
                    last_status = job.status;
                    debug!(
                        job_id = %job_id,
                        status = %job.status,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Polled job status"
                    );
                    observer(&PollTick {
                        attempt,
                        elapsed: start.elapsed(),
                        max_wait,
                        job: Some(&job),
                    });

                    if job.status.is_terminal() {
                        info!(job_id = %job_id, status = %job.status, attempt, "Job finished");
                        return Ok(job);
                    }
                    if job.status == JobStatus::Unknown {
                        warn!(job_id = %job_id, "Unknown job status, continuing to poll");
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(job_id = %job_id, attempt, error = %e, "Status check failed, retrying");
                    observer(&PollTick {
                        attempt,
                        elapsed: start.elapsed(),
                        max_wait,
                        job: None,
                    });
                }
                Err(e) => return Err(e),
            }

            let remaining = remaining_until(deadline);
            if remaining.is_zero() {
                let waited = start.elapsed();
                warn!(
                    job_id = %job_id,
                    last_status = %last_status,
                    waited_ms = waited.as_millis() as u64,
                    "Gave up waiting for job"
                );
                return Err(RelayError::Timeout {
                    job_id: job_id.to_string(),
                    last_status,
                    waited_secs: waited.as_secs(),
                });
            }

            tokio::time::sleep(self.policy.interval.min(remaining)).await;
        }
    }
}

fn remaining_until(deadline: Option<Instant>) -> Duration {
    deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()))
}
