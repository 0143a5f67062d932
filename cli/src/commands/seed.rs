// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Seed management commands
//!
//! Commands: generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use telestack_core::infrastructure::seed::generate_seed_file;

#[derive(Subcommand)]
pub enum SeedCommand {
    /// Generate a random per-host seed file (mode 0600)
    Generate {
        /// Output path
        #[arg(short, long, default_value = "/etc/telestack/seed")]
        output: PathBuf,

        /// Replace an existing seed; rotates every derived secret
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: SeedCommand) -> Result<()> {
    match command {
        SeedCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    generate_seed_file(&output, force)
        .with_context(|| format!("Failed to generate seed at {}", output.display()))?;

    println!(
        "{}",
        format!("✓ Seed generated: {}", output.display()).green()
    );
    if force {
        println!(
            "{}",
            "All derived secrets change with the new seed. Re-apply to update env files.".yellow()
        );
    }
    println!("Reference it with: seed: file:{}", output.display());

    Ok(())
}
