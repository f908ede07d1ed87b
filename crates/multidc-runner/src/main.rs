//! Multi-datacenter environment runner
//!
//! Loads an environment configuration, drives random-policy episodes through
//! any training presentation, and inspects configurations and spaces.

mod commands;
mod output;
mod policy;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, rollout};
use output::{LogFormat, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Hierarchical multi-datacenter environment runner
#[derive(Parser)]
#[command(name = "multidc-runner")]
#[command(author, version, about = "Hierarchical multi-datacenter environment runner", long_about = None)]
pub struct Cli {
    /// Environment configuration file (yaml, json or toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: OutputFormat,

    /// Log format (logs go to stderr)
    #[arg(long, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Use the scripted in-memory simulation instead of the gateway
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run random-policy episodes
    Rollout {
        /// Training presentation to drive
        #[arg(long, value_enum, default_value = "joint")]
        adapter: rollout::AdapterKind,

        /// Number of episodes
        #[arg(long, default_value_t = 1)]
        episodes: u32,

        /// Stop each episode after this many steps
        #[arg(long)]
        max_steps: Option<u64>,

        /// Seed of the first episode, incremented per episode
        #[arg(long, default_value_t = 0)]
        seed: i64,

        /// Trained datacenter for the single-local presentation
        #[arg(long, default_value_t = 0)]
        datacenter: usize,
    },

    /// Validate a configuration file
    ValidateConfig {
        /// Print the JSON sent to the simulator instead of a summary
        #[arg(long)]
        simulator_json: bool,
    },

    /// Show observation and action spaces per agent
    ShowSpaces,
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = session::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Rollout {
            adapter,
            episodes,
            max_steps,
            seed,
            datacenter,
        } => {
            let env = session::build_environment(&config, cli.dry_run)?;
            let options = rollout::RolloutOptions {
                adapter,
                episodes,
                max_steps,
                seed,
                datacenter,
            };
            rollout::rollout(env, options, cli.format)?;
        }
        Commands::ValidateConfig { simulator_json } => {
            inspect::validate_config(&config, simulator_json, cli.format)?;
        }
        Commands::ShowSpaces => {
            let env = session::build_environment(&config, cli.dry_run)?;
            inspect::show_spaces(env, cli.format)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
