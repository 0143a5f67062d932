// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use telestack_core::application::ManifestBuilder;
use telestack_core::domain::stack_config::StackConfigManifest;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./telestack.yaml)
        #[arg(short, long, default_value = "./telestack.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = StackConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. TELESTACK_CONFIG_PATH: {}",
            std::env::var("TELESTACK_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./telestack.yaml");
        println!("  4. ~/.telestack/config.yaml");
        println!("  5. /etc/telestack/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Host:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Project: {}", spec.project);
    println!();

    println!("{}", "Paths:".bold());
    println!("  State: {}", spec.state_path.display());
    println!("  Env files: {}", spec.env_dir.display());
    println!("  Compose file: {}", spec.compose_file.display());
    println!(
        "  Seed: {}",
        spec.seed.as_deref().unwrap_or("(not set)")
    );
    println!();

    println!("{}", "Ports:".bold());
    println!("  Application: {}", spec.port);
    println!("  Dashboard: {}", spec.grafana_port);
    if let Some(port) = spec.database.host_port {
        println!("  Database: {}", port);
    }
    println!();

    println!("{}", "MQTT:".bold());
    println!(
        "  Broker: {}:{}",
        spec.mqtt.host.as_deref().unwrap_or("(not set)"),
        spec.mqtt.port
    );
    println!(
        "  Username: {}",
        spec.mqtt.username.as_deref().unwrap_or("(not set)")
    );
    // Never echo the password itself
    println!(
        "  Password: {}",
        if spec.mqtt.password.is_some() { "(set)" } else { "(not set)" }
    );
    println!();

    println!("{}", "Identities:".bold());
    println!(
        "  Group: {} ({})",
        spec.identities.group.name, spec.identities.group.gid
    );
    for (service, uid) in &spec.identities.accounts {
        println!("  {} → uid {}", service, uid);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = StackConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    let manifests = ManifestBuilder::new(&config.spec)
        .build()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    for manifest in &manifests {
        println!("  {} ({})", manifest.service_name, manifest.image);
    }

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
