//! Alertswarm CLI: run alert investigations from the terminal.

mod commands;
mod dataset;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Alertswarm: multi-agent first-pass investigation of security alerts
#[derive(Parser, Debug)]
#[command(name = "alertswarm", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (looked up for .alertswarm/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces user and workspace config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Investigate one alert against a local dataset
    Investigate {
        /// Alert JSON file ("-" reads stdin)
        alert: PathBuf,

        /// Dataset JSON with cases, users, sessions, logins, and events
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Override the configured round cap
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Override the alert's tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Print the persisted analysis record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the entities extracted from an alert
    Extract {
        /// Alert JSON file ("-" reads stdin)
        alert: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default config to .alertswarm/config.toml
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Findings and reports go to stdout; logs stay on stderr.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "alertswarm", "alertswarm")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "alertswarm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = match &cli.config {
        Some(path) => alertswarm_core::config::load_config_file(path),
        None => alertswarm_core::config::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    commands::handle_command(cli.command, config, &workspace).await
}
