//! HTTP server for the local endpoint emulator.
//!
//! Serves the same routes as the hosted API and runs each submitted job on a
//! spawned task through the configured [`JobHandler`].

use crate::emulator::handler::JobHandler;
use crate::protocol::{
    ErrorBody, HealthReport, Job, JobCounters, JobStatus, RunRequest, WorkerCounters,
};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

/// Emulator settings.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// The only endpoint id this emulator answers for.
    pub endpoint_id: String,
    /// Required bearer token. `None` accepts any caller.
    pub api_key: Option<String>,
    /// Simulated worker provisioning delay before each job starts.
    pub cold_start: Duration,
    /// How long a finished job stays readable through `/status`.
    pub retention: Duration,
}

/// Finished jobs are kept this long by default (30 minutes).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);

/// Shared emulator state.
#[derive(Clone)]
pub struct EmulatorState {
    config: Arc<EmulatorConfig>,
    handler: Arc<dyn JobHandler>,
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    next_id: Arc<AtomicU64>,
}

impl EmulatorState {
    pub fn new(config: EmulatorConfig, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Check the bearer token and endpoint id of a request.
    fn authorize(
        &self,
        endpoint_id: &str,
        headers: &HeaderMap,
    ) -> Result<(), (StatusCode, Json<ErrorBody>)> {
        if let Some(expected) = &self.config.api_key {
            let token = headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            if token != Some(expected.as_str()) {
                warn!(endpoint_id = %endpoint_id, "Rejected request with bad credentials");
                return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
            }
        }

        if endpoint_id != self.config.endpoint_id {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("endpoint {endpoint_id} not found"),
            ));
        }

        Ok(())
    }

    async fn update(&self, job_id: &str, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.jobs.write().await.get_mut(job_id) {
            f(job);
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Build the emulator router.
pub fn router(state: EmulatorState) -> Router {
    Router::new()
        .route("/v2/{endpoint_id}/run", post(run_job))
        .route("/v2/{endpoint_id}/status/{job_id}", get(job_status))
        .route("/v2/{endpoint_id}/health", get(health))
        .with_state(state)
}

/// Run the emulator until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, state: EmulatorState) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!(
        addr = %addr,
        endpoint_id = %state.config.endpoint_id,
        handler = state.handler.name(),
        "Emulator listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Emulator server failed")?;

    info!("Emulator stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}

/// `POST /v2/{endpoint_id}/run`
async fn run_job(
    State(state): State<EmulatorState>,
    Path(endpoint_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> ApiResult<Job> {
    state.authorize(&endpoint_id, &headers)?;

    let n = state.next_id.fetch_add(1, Ordering::Relaxed);
    let job = Job::queued(format!("{endpoint_id}-job-{n}"));
    state.jobs.write().await.insert(job.id.clone(), job.clone());
    info!(job_id = %job.id, "Job queued");

    let job_id = job.id.clone();
    let task_state = state.clone();
    tokio::spawn(async move {
        process_job(task_state.clone(), job_id.clone(), request.input).await;
        expire_job(task_state, job_id).await;
    });

    Ok(Json(job))
}

/// `GET /v2/{endpoint_id}/status/{job_id}`
async fn job_status(
    State(state): State<EmulatorState>,
    Path((endpoint_id, job_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Job> {
    state.authorize(&endpoint_id, &headers)?;

    match state.jobs.read().await.get(&job_id) {
        Some(job) => Ok(Json(job.clone())),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("job {job_id} not found"),
        )),
    }
}

/// `GET /v2/{endpoint_id}/health`
async fn health(
    State(state): State<EmulatorState>,
    Path(endpoint_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<HealthReport> {
    state.authorize(&endpoint_id, &headers)?;

    let jobs = state.jobs.read().await;
    let mut counters = JobCounters::default();
    for job in jobs.values() {
        match job.status {
            JobStatus::Completed => counters.completed += 1,
            JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled => {
                counters.failed += 1
            }
            JobStatus::InProgress => counters.in_progress += 1,
            JobStatus::InQueue | JobStatus::Unknown => counters.in_queue += 1,
        }
    }

    let workers = WorkerCounters {
        idle: u64::from(counters.in_progress == 0),
        running: counters.in_progress,
    };

    Ok(Json(HealthReport {
        jobs: counters,
        workers,
    }))
}

/// Drive one job through queued → in progress → completed/failed.
async fn process_job(state: EmulatorState, job_id: String, input: Value) {
    let queued_at = Instant::now();
    if !state.config.cold_start.is_zero() {
        debug!(job_id = %job_id, "Simulating cold start");
        tokio::time::sleep(state.config.cold_start).await;
    }

    let delay_ms = queued_at.elapsed().as_millis() as u64;
    state
        .update(&job_id, |job| {
            job.status = JobStatus::InProgress;
            job.delay_time = Some(delay_ms);
        })
        .await;

    let started = Instant::now();
    let result = state.handler.handle(&input).await;
    let execution_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => info!(job_id = %job_id, execution_ms, "Job completed"),
        Err(e) => warn!(job_id = %job_id, error = %e, "Job failed"),
    }

    state
        .update(&job_id, |job| {
            job.execution_time = Some(execution_ms);
            match result {
                Ok(output) => {
                    job.status = JobStatus::Completed;
                    job.output = Some(output);
                }
                Err(message) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(message);
                }
            }
        })
        .await;
}

/// Forget a finished job once its retention period is over.
async fn expire_job(state: EmulatorState, job_id: String) {
    tokio::time::sleep(state.config.retention).await;
    if state.jobs.write().await.remove(&job_id).is_some() {
        debug!(job_id = %job_id, "Job expired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::handler::EchoHandler;
    use axum::http::HeaderValue;

    fn state(api_key: Option<&str>) -> EmulatorState {
        EmulatorState::new(
            EmulatorConfig {
                endpoint_id: "local".into(),
                api_key: api_key.map(str::to_string),
                cold_start: Duration::ZERO,
                retention: Duration::from_millis(50),
            },
            Arc::new(EchoHandler),
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_authorize_open_emulator() {
        let state = state(None);
        assert!(state.authorize("local", &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_authorize_rejects_bad_token() {
        let state = state(Some("secret"));
        let (status, _) = state.authorize("local", &bearer("wrong")).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(state.authorize("local", &bearer("secret")).is_ok());
    }

    #[test]
    fn test_authorize_unknown_endpoint() {
        let state = state(Some("secret"));
        let (status, _) = state.authorize("other", &bearer("secret")).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_process_job_completes() {
        let state = state(None);
        let job = Job::queued("local-job-1");
        state.jobs.write().await.insert(job.id.clone(), job);

        process_job(
            state.clone(),
            "local-job-1".into(),
            serde_json::json!({ "prompt": "hi" }),
        )
        .await;

        let jobs = state.jobs.read().await;
        let job = &jobs["local-job-1"];
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.output,
            Some(serde_json::json!("GPU Received your message: hi"))
        );
        assert!(job.execution_time.is_some());
    }

    #[tokio::test]
    async fn test_finished_job_expires_after_retention() {
        let state = state(None);
        let job = Job::queued("local-job-2");
        state.jobs.write().await.insert(job.id.clone(), job);

        process_job(state.clone(), "local-job-2".into(), serde_json::json!({})).await;
        assert!(state.jobs.read().await.contains_key("local-job-2"));

        let started = Instant::now();
        expire_job(state.clone(), "local-job-2".into()).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(state.jobs.read().await.is_empty());
    }
}
