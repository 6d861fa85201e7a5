/*!
 * Storelink CLI - Command Line Interface
 *
 * Probe storefront endpoints through the resilience engine and manage the
 * client configuration file.
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use storelink::{
    config::{LogLevel, StorelinkConfig, TelemetrySinkKind},
    error::{StorelinkError, EXIT_FATAL, EXIT_SUCCESS},
    logging, StorefrontClient,
};
use storelink_core_resilience::CircuitSnapshot;

#[derive(Parser)]
#[command(name = "storelink")]
#[command(version, about = "Resilient storefront API client with retries, circuit breaking and correlation tracking", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an endpoint through the retry and circuit breaker pipeline
    Probe {
        /// Endpoint path (resolved against the base URL) or absolute URL
        endpoint: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Override http.base_url
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Correlation id for the calls (generated when omitted)
        #[arg(long, value_name = "ID")]
        correlation_id: Option<String>,

        /// Number of sequential calls
        #[arg(short = 'n', long, default_value = "1")]
        repeat: u32,

        /// Override telemetry.sink
        #[arg(long, value_enum)]
        telemetry: Option<TelemetryArg>,

        /// Print each outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration to a file
    Init {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TelemetryArg {
    None,
    Tracing,
    Stdout,
    Stderr,
}

impl From<TelemetryArg> for TelemetrySinkKind {
    fn from(arg: TelemetryArg) -> Self {
        match arg {
            TelemetryArg::None => TelemetrySinkKind::None,
            TelemetryArg::Tracing => TelemetrySinkKind::Tracing,
            TelemetryArg::Stdout => TelemetrySinkKind::Stdout,
            TelemetryArg::Stderr => TelemetrySinkKind::Stderr,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<StorelinkError>()
                .map(StorelinkError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StorelinkConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load config file {}",
            cli.config
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        )
    })?;

    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    if cli.log.is_some() {
        config.logging.file = cli.log.clone();
    }
    config.logging.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Probe {
            endpoint,
            method,
            base_url,
            correlation_id,
            repeat,
            telemetry,
            json,
        } => {
            if let Some(base_url) = base_url {
                config.http.base_url = base_url;
            }
            if let Some(sink) = telemetry {
                config.telemetry.sink = sink.into();
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(probe(
                &config,
                &endpoint,
                &method,
                correlation_id.as_deref(),
                repeat.max(1),
                json,
            ))
        }
        Commands::Config(ConfigCommands::Init { path, force }) => config_init(&path, force),
        Commands::Config(ConfigCommands::Show) => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

async fn probe(
    config: &StorelinkConfig,
    endpoint: &str,
    method: &str,
    correlation_id: Option<&str>,
    repeat: u32,
    json: bool,
) -> Result<()> {
    let client = StorefrontClient::from_config(config)?;

    let mut last_error = None;
    for i in 1..=repeat {
        // Without an explicit id every call starts its own flow with a fresh one
        match client.call(method, endpoint, correlation_id).await {
            Ok(invocation) => {
                if json {
                    println!("{}", serde_json::to_string(&invocation.outcome)?);
                } else {
                    println!(
                        "[{}] {} {} -> {} in {}ms after {} attempt(s) (correlation {})",
                        i,
                        method,
                        endpoint,
                        invocation.response.status,
                        invocation.duration.as_millis(),
                        invocation.attempts,
                        invocation.outcome.correlation_id
                    );
                }
                last_error = None;
            }
            Err(e) => {
                match (json, e.outcome()) {
                    (true, Some(outcome)) => println!("{}", serde_json::to_string(outcome)?),
                    _ => println!("[{}] {} {} -> {}", i, method, endpoint, e),
                }
                last_error = Some(e);
            }
        }
    }

    client.flush_telemetry().await;
    print_snapshots(&client.snapshots());

    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_snapshots(snapshots: &[CircuitSnapshot]) {
    if snapshots.is_empty() {
        return;
    }
    println!();
    println!(
        "{:<32} {:<10} {:>8} {:>8} {:>10}",
        "breaker", "state", "samples", "rate", "reopen_in"
    );
    for snapshot in snapshots {
        let reopen = snapshot
            .open_remaining
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<32} {:<10} {:>8} {:>8.2} {:>10}",
            snapshot.key,
            snapshot.state.to_string(),
            snapshot.sample_count,
            snapshot.failure_rate,
            reopen
        );
    }
}

fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(StorelinkError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ))
        .into());
    }
    StorelinkConfig::default()
        .to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
