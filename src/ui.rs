//! Terminal helpers for CLI output.
//!
//! Status lines go to stderr so stdout carries only results.

use crate::client::PollTick;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a section rule with a title.
pub fn print_section(title: &str) {
    eprintln!("{}", "=".repeat(60).bright_black());
    eprintln!("{}", title.green().bold());
    eprintln!("{}", "=".repeat(60).bright_black());
}

/// Print a step indicator with message.
pub fn print_step(label: &str, message: &str) {
    eprintln!("{} {}", label.cyan(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print a hint below an error.
pub fn print_hint(message: &str) {
    eprintln!("  {}", message.bright_black());
}

/// Progress display while waiting for a job.
pub struct WaitProgress {
    bar: ProgressBar,
}

impl WaitProgress {
    /// A bar spanning `max_wait_secs`, drawn on stderr (hidden when not a TTY).
    pub fn new(max_wait_secs: u64) -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} Waiting for GPU response [{bar:30.cyan/blue}] {pos}/{len}s {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = ProgressBar::new(max_wait_secs.max(1)).with_style(style);
        Self { bar }
    }

    /// Reflect one poll observation.
    pub fn observe(&self, tick: &PollTick<'_>) {
        self.bar
            .set_position(tick.elapsed.as_secs().min(tick.max_wait.as_secs()));
        match tick.job {
            Some(job) => self.bar.set_message(job.status.to_string()),
            None => self.bar.set_message(format!("retrying (attempt {})", tick.attempt)),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
