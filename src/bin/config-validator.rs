//! # Batchline Configuration Validator
//!
//! Command-line tool for checking a batchline configuration before the
//! service starts: loads the layered configuration, validates it and prints
//! a view with credentials masked.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use batchline_core::config::{BatchlineConfig, ConfigLoader};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "batchline-config")]
#[command(about = "Validate batchline configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: BATCHLINE_CONFIG_PATH, then config/batchline.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the merged configuration as JSON with credentials masked
    Show,

    /// Print the compensation retry schedule
    Backoff,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Backoff) => backoff(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration check completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration check failed: {e:#}");
            eprintln!("Configuration invalid: {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<BatchlineConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load().context("loading default configuration")?,
    };
    Ok(config)
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    println!("Environment: {}", ConfigLoader::detect_environment());
    println!("Store backend: {:?}", config.store.backend);
    println!("Notification provider: {:?}", config.notifications.provider);
    println!(
        "Compensation: {} attempts, {}ms base delay",
        config.compensation.max_attempts, config.compensation.base_delay_ms
    );
    println!("Configuration is valid");
    Ok(())
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    let rendered = serde_json::to_string_pretty(&config.sanitized())
        .context("rendering configuration")?;
    println!("{rendered}");
    Ok(())
}

fn backoff(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    let policy = &config.compensation;
    println!("attempt  delay_before_ms");
    for attempt in 1..=policy.max_attempts {
        let delay = if attempt == 1 {
            0
        } else {
            policy.backoff_delay(attempt - 1).as_millis()
        };
        println!("{attempt:>7}  {delay:>15}");
    }
    Ok(())
}
