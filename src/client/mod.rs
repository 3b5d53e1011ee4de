//! Client for the serverless endpoint.
//!
//! The client is a thin request/poll wrapper that:
//! - Submits a job envelope with bearer authentication
//! - Polls the job status at a fixed interval
//! - Gives up locally once the caller's wait bound elapses

pub mod http;
pub mod poll;

pub use http::{RelayClient, Submission};
pub use poll::{PollPolicy, PollTick, MIN_POLL_INTERVAL, MIN_REQUEST_TIMEOUT};
