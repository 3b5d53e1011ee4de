//! gpu-bridge - relay prompts to a serverless GPU endpoint.
//!
//! Submits a job to a hosted endpoint, polls its status at a fixed interval
//! until it finishes or a local wait bound elapses, and hands back the
//! output. A local emulator of the endpoint API is included for development
//! and container use.
//!
//! ## Example
//!
//! ```ignore
//! use gpu_bridge::{Credentials, RelayClient};
//! use std::time::Duration;
//!
//! let client = RelayClient::new(Credentials::new(api_key, endpoint_id))?;
//! let job_id = client.submit(serde_json::json!({ "prompt": "Hello GPU!" })).await?;
//! let job = client.await_completion(&job_id, Duration::from_secs(60)).await?;
//! println!("{}", job.into_output()?);
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod emulator;
pub mod error;
pub mod protocol;
pub mod ui;

pub use client::{PollPolicy, PollTick, RelayClient, Submission};
pub use config::{Config, Credentials};
pub use error::RelayError;
pub use protocol::{HealthReport, Job, JobStatus, RunRequest};
