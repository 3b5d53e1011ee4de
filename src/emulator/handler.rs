//! Job handlers run by the emulator.
//!
//! A handler is the processing function that would run on the GPU worker.
//! It receives the `input` object of the submission envelope and returns the
//! job output, or an error message that marks the job as failed.

use async_trait::async_trait;
use serde_json::Value;

/// The processing function behind an endpoint.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handler name, for logs.
    fn name(&self) -> &'static str;

    /// Process one job input.
    async fn handle(&self, input: &Value) -> Result<Value, String>;
}

/// Echoes the prompt back, like the starter worker template.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn handle(&self, input: &Value) -> Result<Value, String> {
        let prompt = input
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or("No prompt provided");
        Ok(Value::String(format!("GPU Received your message: {prompt}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_prompt() {
        let out = EchoHandler
            .handle(&json!({ "prompt": "Hello GPU!" }))
            .await
            .unwrap();
        assert_eq!(out, json!("GPU Received your message: Hello GPU!"));
    }

    #[tokio::test]
    async fn test_echo_missing_prompt() {
        let out = EchoHandler.handle(&json!({ "n": 3 })).await.unwrap();
        assert_eq!(out, json!("GPU Received your message: No prompt provided"));
    }
}
