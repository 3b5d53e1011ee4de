//! The relay client talking to the local endpoint emulator.

use async_trait::async_trait;
use gpu_bridge::emulator::{
    router, EchoHandler, EmulatorConfig, EmulatorState, JobHandler, DEFAULT_RETENTION,
};
use gpu_bridge::{Credentials, JobStatus, PollPolicy, RelayClient, RelayError};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Fails every job.
struct BrokenHandler;

#[async_trait]
impl JobHandler for BrokenHandler {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn handle(&self, _input: &Value) -> Result<Value, String> {
        Err("model weights missing".to_string())
    }
}

/// Start an emulator on a random port.
async fn start_emulator(handler: Arc<dyn JobHandler>, cold_start: Duration) -> SocketAddr {
    start_emulator_with(handler, cold_start, DEFAULT_RETENTION).await
}

async fn start_emulator_with(
    handler: Arc<dyn JobHandler>,
    cold_start: Duration,
    retention: Duration,
) -> SocketAddr {
    let state = EmulatorState::new(
        EmulatorConfig {
            endpoint_id: "local".into(),
            api_key: Some("secret".into()),
            cold_start,
            retention,
        },
        handler,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, api_key: &str, endpoint_id: &str) -> RelayClient {
    RelayClient::with_api_url(
        Credentials::new(api_key, endpoint_id),
        format!("http://{addr}/v2"),
    )
    .unwrap()
    .with_poll_policy(PollPolicy {
        interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn echo_round_trip() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::ZERO).await;
    let client = client(addr, "secret", "local");

    let job = client
        .run(json!({ "prompt": "Hello from my local machine!" }), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.delay_time.is_some());
    assert_eq!(
        job.into_output().unwrap(),
        json!("GPU Received your message: Hello from my local machine!")
    );
}

#[tokio::test]
async fn wrong_key_and_unknown_endpoint_are_rejected() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::ZERO).await;

    let err = client(addr, "nope", "local")
        .submit(json!({ "prompt": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Authentication { .. }), "got {err:?}");

    let err = client(addr, "secret", "elsewhere")
        .submit(json!({ "prompt": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::ZERO).await;

    let err = client(addr, "secret", "local")
        .status("local-job-999")
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn handler_errors_fail_the_job() {
    let addr = start_emulator(Arc::new(BrokenHandler), Duration::ZERO).await;

    let job = client(addr, "secret", "local")
        .run(json!({ "prompt": "x" }), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("model weights missing"));
}

#[tokio::test]
async fn cold_start_is_observed_as_queue_time() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::from_millis(300)).await;
    let client = client(addr, "secret", "local");

    let job_id = client.submit(json!({ "prompt": "warm up" })).await.unwrap();

    let mut seen = Vec::new();
    let job = client
        .await_completion_with(&job_id, Duration::from_secs(5), |tick| {
            if let Some(job) = tick.job {
                seen.push(job.status);
            }
        })
        .await
        .unwrap();

    assert_eq!(seen.first(), Some(&JobStatus::InQueue));
    assert_eq!(seen.last(), Some(&JobStatus::Completed));
    assert!(job.delay_time.unwrap() >= 300);
}

#[tokio::test]
async fn cold_start_longer_than_wait_times_out() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::from_secs(10)).await;
    let client = client(addr, "secret", "local");

    let job_id = client.submit(json!({ "prompt": "x" })).await.unwrap();
    let err = client
        .await_completion(&job_id, Duration::from_millis(200))
        .await
        .unwrap_err();

    match err {
        RelayError::Timeout {
            job_id: id,
            last_status,
            ..
        } => {
            assert_eq!(id, job_id);
            assert_eq!(last_status, JobStatus::InQueue);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn health_counts_jobs() {
    let addr = start_emulator(Arc::new(EchoHandler), Duration::ZERO).await;
    let client = client(addr, "secret", "local");

    for prompt in ["a", "b"] {
        client
            .run(json!({ "prompt": prompt }), Duration::from_secs(5))
            .await
            .unwrap();
    }

    let report = client.health().await.unwrap();
    assert_eq!(report.jobs.completed, 2);
    assert_eq!(report.jobs.in_queue, 0);
    assert_eq!(report.workers.idle, 1);
}

#[tokio::test]
async fn finished_jobs_expire_after_retention() {
    let addr =
        start_emulator_with(Arc::new(EchoHandler), Duration::ZERO, Duration::from_millis(200))
            .await;
    let client = client(addr, "secret", "local");

    let job_id = client.submit(json!({ "prompt": "x" })).await.unwrap();
    let job = client
        .await_completion(&job_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let err = client.status(&job_id).await.unwrap_err();
    assert!(matches!(err, RelayError::NotFound { .. }), "got {err:?}");
    assert_eq!(client.health().await.unwrap().jobs.completed, 0);
}
