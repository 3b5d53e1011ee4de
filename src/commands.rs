//! CLI command handlers.
//!
//! Handlers write their results to the given writer and report progress on
//! stderr through [`crate::ui`]. Errors are returned untouched so the binary
//! can map them to an exit code.

use crate::client::{RelayClient, Submission};
use crate::protocol::{Job, RunRequest};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use serde_json::{Map, Value};
use std::io::Write;
use std::time::Duration;

/// Options for the `send` command.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Text prompt.
    pub prompt: String,
    /// Extra input fields, sent next to the prompt.
    pub params: Vec<(String, Value)>,
    /// Local wait bound.
    pub wait: Duration,
    /// Print the full job document instead of just the output.
    pub json_output: bool,
}

/// Parse a `KEY=VALUE` parameter. Values are JSON when they parse as JSON,
/// strings otherwise.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Submit a prompt and wait for the result.
pub async fn send<W: Write>(client: &RelayClient, opts: SendOptions, out: &mut W) -> Result<()> {
    ui::print_step("📤 Sending to GPU:", &opts.prompt);

    let params: Map<String, Value> = opts.params.into_iter().collect();
    let request = RunRequest::prompt(opts.prompt, params);
    let job = match client.start(request.input).await? {
        Submission::Queued(job_id) => {
            ui::print_step("Job submitted:", &job_id);

            let progress = ui::WaitProgress::new(opts.wait.as_secs());
            let result = client
                .await_completion_with(&job_id, opts.wait, |tick| progress.observe(tick))
                .await;
            progress.finish();
            result?
        }
        Submission::Finished(job) => job,
    };
    let summary = summarize(&job);

    if opts.json_output {
        writeln!(out, "{}", serde_json::to_string_pretty(&job)?)?;
        job.into_output()?;
        return Ok(());
    }

    let output = job.into_output()?;
    ui::print_section("✅ GPU Response:");
    writeln!(out, "{}", render_output(&output)?)?;
    ui::print_success(&format!("Done! ({summary})"));
    Ok(())
}

/// Render job output for humans: strings verbatim, everything else as pretty JSON.
pub fn render_output(output: &Value) -> Result<String> {
    Ok(match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other)?,
    })
}

/// Check the configuration and, unless `offline`, the endpoint itself.
pub async fn status<W: Write>(client: &RelayClient, offline: bool, out: &mut W) -> Result<()> {
    let credentials = client.credentials();
    credentials.validate()?;

    writeln!(out, "{}", "✓ Configuration looks good!".green())?;
    writeln!(out, "  Endpoint ID: {}", credentials.endpoint_id)?;
    writeln!(out, "  API Key: {}", credentials.masked_key())?;
    writeln!(out, "  API URL: {}", client.api_url())?;

    if !offline {
        let report = client.health().await?;
        writeln!(out, "\n{}", "✓ Endpoint reachable".green())?;
        writeln!(
            out,
            "  Workers: {} idle, {} running",
            report.workers.idle, report.workers.running
        )?;
        writeln!(
            out,
            "  Jobs: {} in queue, {} in progress, {} completed, {} failed",
            report.jobs.in_queue, report.jobs.in_progress, report.jobs.completed, report.jobs.failed
        )?;
    }

    writeln!(out, "\nYou can now send requests to your GPU endpoint!")?;
    Ok(())
}

/// Show example commands.
pub fn examples<W: Write>(out: &mut W) -> Result<()> {
    let examples = [
        ("Send a simple prompt:", r#"gpu-bridge send "Hello GPU!""#),
        (
            "Send a prompt with longer wait time:",
            r#"gpu-bridge send "Complex task" --wait 120"#,
        ),
        (
            "Pass extra input parameters:",
            r#"gpu-bridge send "Summarize this" -p max_tokens=256 -p temperature=0.2"#,
        ),
        (
            "Get full JSON response:",
            r#"gpu-bridge send "My prompt" --json-output"#,
        ),
        ("Check configuration status:", "gpu-bridge status"),
        (
            "Run a local endpoint for testing:",
            "gpu-bridge serve --endpoint-id local",
        ),
        ("Show this help:", "gpu-bridge --help"),
    ];

    writeln!(out, "{}", "GPU Bridge - Example Commands".cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))?;
    for (i, (title, command)) in examples.iter().enumerate() {
        writeln!(out, "\n{}. {}", i + 1, title)?;
        writeln!(out, "   {}", command.yellow())?;
    }
    writeln!(out, "{}", "=".repeat(60))?;
    Ok(())
}

/// Human summary of a terminal job, for logs and messages.
pub fn summarize(job: &Job) -> String {
    let mut summary = if job.id.is_empty() {
        job.status.to_string()
    } else {
        format!("{} {}", job.id, job.status)
    };
    if let Some(ms) = job.execution_time {
        summary.push_str(&format!(" in {ms}ms"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::protocol::JobStatus;
    use serde_json::json;

    #[test]
    fn test_parse_param_json_and_string() {
        assert_eq!(
            parse_param("max_tokens=256").unwrap(),
            ("max_tokens".to_string(), json!(256))
        );
        assert_eq!(
            parse_param("model=llama-3").unwrap(),
            ("model".to_string(), json!("llama-3"))
        );
        assert_eq!(
            parse_param("stop=[\"\\n\"]").unwrap(),
            ("stop".to_string(), json!(["\n"]))
        );
        assert_eq!(
            parse_param("note=a=b").unwrap(),
            ("note".to_string(), json!("a=b"))
        );
    }

    #[test]
    fn test_parse_param_invalid() {
        assert!(parse_param("no-equals").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn test_render_output() {
        assert_eq!(render_output(&json!("world")).unwrap(), "world");
        assert_eq!(
            render_output(&json!({ "text": "hi" })).unwrap(),
            "{\n  \"text\": \"hi\"\n}"
        );
    }

    #[test]
    fn test_examples_lists_commands() {
        let mut out = Vec::new();
        examples(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("gpu-bridge send"));
        assert!(text.contains("gpu-bridge status"));
    }

    #[tokio::test]
    async fn test_status_offline_masks_key() {
        let client = RelayClient::with_api_url(
            Credentials::new("rp_secret_1234", "abc123"),
            "http://127.0.0.1:9",
        )
        .unwrap();
        let mut out = Vec::new();
        status(&client, true, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("abc123"));
        assert!(text.contains("**********1234"));
        assert!(!text.contains("rp_secret"));
    }

    #[test]
    fn test_summarize() {
        let mut job = Job::queued("job-9");
        job.status = JobStatus::Completed;
        job.execution_time = Some(12);
        assert_eq!(summarize(&job), "job-9 COMPLETED in 12ms");

        job.id.clear();
        job.execution_time = None;
        assert_eq!(summarize(&job), "COMPLETED");
    }
}
