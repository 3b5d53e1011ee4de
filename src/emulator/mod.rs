//! Local endpoint emulator.
//!
//! The emulator is a small HTTP server that:
//! - Speaks the same `/v2/{endpoint_id}` routes as the hosted API
//! - Checks the bearer token and endpoint id like the platform does
//! - Runs submitted jobs through a pluggable [`JobHandler`]
//! - Keeps jobs in memory only, and forgets finished ones after a while
//!
//! It is what the container image runs, and what integration tests talk to.

pub mod handler;
pub mod server;

pub use handler::{EchoHandler, JobHandler};
pub use server::{router, serve, EmulatorConfig, EmulatorState, DEFAULT_RETENTION};
