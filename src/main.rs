//! gpu-bridge - send prompts to a serverless GPU endpoint from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gpu_bridge::commands::{self, SendOptions};
use gpu_bridge::config::{Config, Overrides, MAX_WAIT_SECS};
use gpu_bridge::emulator::{EchoHandler, EmulatorConfig, EmulatorState, DEFAULT_RETENTION};
use gpu_bridge::{ui, PollPolicy, RelayClient, RelayError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Lower bound for `--poll-interval-ms`, matching the client floor.
const MIN_POLL_INTERVAL_MS: u64 = 50;

#[derive(Parser)]
#[command(name = "gpu-bridge")]
#[command(author, version, about = "Send prompts to your serverless GPU endpoint")]
#[command(long_about = "Relays prompts from this machine to a serverless GPU endpoint and waits for the result.\n\nRun `gpu-bridge examples` to see common invocations.")]
struct Cli {
    /// API key (or set RUNPOD_API_KEY)
    #[arg(long, env = "RUNPOD_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Serverless endpoint id (or set RUNPOD_ENDPOINT_ID)
    #[arg(long, env = "RUNPOD_ENDPOINT_ID", global = true)]
    endpoint_id: Option<String>,

    /// API base URL (or set RUNPOD_API_URL)
    #[arg(long, env = "RUNPOD_API_URL", global = true)]
    api_url: Option<String>,

    /// Config file path (default: ~/.config/gpu-bridge/config.toml)
    #[arg(long, env = "GPU_BRIDGE_CONFIG", global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that your endpoint configuration is valid and reachable
    Status {
        /// Only check the local configuration
        #[arg(long)]
        offline: bool,
    },
    /// Send a prompt to the GPU endpoint and wait for the response
    Send {
        /// The prompt text
        prompt: String,

        /// Maximum time to wait for a response (seconds, at most one day)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(..=MAX_WAIT_SECS))]
        wait: Option<u64>,

        /// Output the full JSON response
        #[arg(long)]
        json_output: bool,

        /// Extra input parameter (repeatable)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = commands::parse_param)]
        params: Vec<(String, Value)>,

        /// Delay between status checks (milliseconds, at least 50)
        #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(MIN_POLL_INTERVAL_MS..))]
        poll_interval_ms: Option<u64>,
    },
    /// Show example commands
    Examples,
    /// Open configuration file in $EDITOR
    Config,
    /// Run a local emulator of the endpoint API
    Serve {
        /// Address to listen on
        #[arg(long, env = "GPU_BRIDGE_BIND", default_value = "127.0.0.1:8000")]
        bind: String,

        /// Simulated cold-start delay before each job (milliseconds)
        #[arg(long, value_name = "MS", default_value_t = 0)]
        cold_start_ms: u64,

        /// How long finished jobs stay queryable (seconds)
        #[arg(long, value_name = "SECS", default_value_t = DEFAULT_RETENTION.as_secs())]
        retention_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let code = match e.downcast_ref::<RelayError>() {
            Some(relay) => {
                ui::print_error(&relay.to_string());
                ui::print_hint(relay.remedy());
                relay.exit_code()
            }
            None => {
                ui::print_error(&format!("Error: {:#}", e));
                1
            }
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let serving = matches!(cli.command, Commands::Serve { .. });
    init_logging(cli.verbose, serving);

    let (config_path, explicit_path) = match cli.config {
        Some(path) => (path, true),
        None => (Config::config_path()?, false),
    };

    let overrides = Overrides {
        api_key: cli.api_key,
        endpoint_id: cli.endpoint_id,
        api_url: cli.api_url,
    };
    // Loaded per command: `config` must work on a file that does not load.
    let load_config = || -> Result<Config> {
        let mut config = Config::load_from(&config_path)?;
        config.apply(overrides.clone());
        Ok(config)
    };

    match cli.command {
        Commands::Status { offline } => {
            let config = load_config()?;
            let client = build_client(&config, None)?;
            commands::status(&client, offline, &mut std::io::stdout()).await
        }
        Commands::Send {
            prompt,
            wait,
            json_output,
            params,
            poll_interval_ms,
        } => {
            let config = load_config()?;
            let client = build_client(&config, poll_interval_ms)?;
            let opts = SendOptions {
                prompt,
                params,
                wait: Duration::from_secs(wait.unwrap_or(config.polling.default_wait_secs)),
                json_output,
            };
            commands::send(&client, opts, &mut std::io::stdout()).await
        }
        Commands::Examples => commands::examples(&mut std::io::stdout()),
        Commands::Config => handle_config(&config_path, explicit_path),
        Commands::Serve {
            bind,
            cold_start_ms,
            retention_secs,
        } => {
            let timing = EmulatorTiming {
                cold_start: Duration::from_millis(cold_start_ms),
                retention: Duration::from_secs(retention_secs),
            };
            handle_serve(&load_config()?, &bind, timing).await
        }
    }
}

/// Initialize logging on stderr. `RUST_LOG` overrides the defaults.
fn init_logging(verbose: bool, serving: bool) {
    let level = if verbose {
        "debug"
    } else if serving {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gpu_bridge={level},reqwest=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(config: &Config, poll_interval_ms: Option<u64>) -> Result<RelayClient> {
    let policy = PollPolicy {
        interval: poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.polling.interval()),
        request_timeout: config.polling.request_timeout(),
    };

    let client = RelayClient::with_api_url(config.credentials(), &config.endpoint.api_url)?
        .with_poll_policy(policy);
    Ok(client)
}

/// Create the config file if needed and open it in `$EDITOR`.
///
/// `$EDITOR` may carry arguments, e.g. `code --wait`.
fn handle_config(config_path: &Path, explicit_path: bool) -> Result<()> {
    let source = if explicit_path {
        "--config / GPU_BRIDGE_CONFIG"
    } else {
        "default location"
    };
    ui::print_step("Config file:", &format!("{} ({source})", config_path.display()));

    if !config_path.exists() {
        Config::default().save_to(config_path)?;
        ui::print_success("Created a config file with placeholder credentials");
        ui::print_hint("Replace YOUR_API_KEY_HERE and YOUR_ENDPOINT_ID_HERE, then run `gpu-bridge status`.");
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let mut words = editor.split_whitespace();
    let program = words.next().unwrap_or("vi");

    let status = ProcessCommand::new(program)
        .args(words)
        .arg(config_path)
        .status()
        .with_context(|| format!("Failed to open editor '{editor}'"))?;
    if !status.success() {
        bail!("Editor '{editor}' exited with {status}");
    }

    // Catch mistakes before the next command trips over them.
    Config::load_from(config_path)?;
    Ok(())
}

/// Emulator timing knobs from the command line.
struct EmulatorTiming {
    cold_start: Duration,
    retention: Duration,
}

/// Run the emulator in the foreground.
async fn handle_serve(config: &Config, bind: &str, timing: EmulatorTiming) -> Result<()> {
    let credentials = config.credentials();

    // Without a configured key the emulator accepts any caller.
    let endpoint_id = if credentials.has_endpoint_id() {
        credentials.endpoint_id.trim().to_string()
    } else {
        "local".to_string()
    };
    let api_key = credentials
        .has_api_key()
        .then(|| credentials.api_key.trim().to_string());

    let emulator_config = EmulatorConfig {
        endpoint_id,
        api_key,
        cold_start: timing.cold_start,
        retention: timing.retention,
    };
    info!(
        endpoint_id = %emulator_config.endpoint_id,
        auth = emulator_config.api_key.is_some(),
        retention_secs = emulator_config.retention.as_secs(),
        "Starting emulator"
    );

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    let state = EmulatorState::new(emulator_config, Arc::new(EchoHandler));
    gpu_bridge::emulator::serve(listener, state).await
}
