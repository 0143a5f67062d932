// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # telestack
//!
//! Provisions and deploys a single-host TeslaMate stack: PostgreSQL,
//! TeslaMate and Grafana.
//!
//! ## Commands
//!
//! - `telestack config show|validate|generate` - Configuration management
//! - `telestack seed generate` - Create the per-host secret seed
//! - `telestack plan` - Show what apply would provision (no secret values)
//! - `telestack render` - Print the compose document
//! - `telestack apply [--up]` - Provision accounts, directories, env files and compose file
//! - `telestack status` - Container state of each service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use telestack_cli::commands::{self, deploy, ConfigCommand, SeedCommand};

/// telestack - Deterministic single-host TeslaMate deployment
#[derive(Parser)]
#[command(name = "telestack")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TELESTACK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TELESTACK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "TELESTACK_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Secret seed management
    #[command(name = "seed")]
    Seed {
        #[command(subcommand)]
        command: SeedCommand,
    },

    /// Show the deployment plan
    #[command(name = "plan")]
    Plan(deploy::PlanArgs),

    /// Render the compose document
    #[command(name = "render")]
    Render(deploy::RenderArgs),

    /// Provision the host and optionally start the stack
    #[command(name = "apply")]
    Apply(deploy::ApplyArgs),

    /// Show container status of each service
    #[command(name = "status")]
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Seed { command }) => commands::seed::handle_command(command).await,
        Some(Commands::Plan(args)) => deploy::plan(cli.config, args).await,
        Some(Commands::Render(args)) => deploy::render(cli.config, args).await,
        Some(Commands::Apply(args)) => deploy::apply(cli.config, args).await,
        Some(Commands::Status) => commands::status::status(cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
///
/// Logs go to stderr so `render` and `plan --json` output stays parseable.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
