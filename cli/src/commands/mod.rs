// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the telestack CLI

pub mod config;
pub mod deploy;
pub mod seed;
pub mod status;

pub use self::config::ConfigCommand;
pub use self::seed::SeedCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use telestack_core::application::DeploymentPlan;
use telestack_core::domain::secret::{SecretError, SecretSeed};
use telestack_core::domain::stack_config::StackConfigManifest;
use telestack_core::infrastructure::seed::load_seed;

/// Load, override and validate the stack configuration
pub fn load_config(config_override: Option<PathBuf>) -> Result<StackConfigManifest> {
    let config = StackConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Resolve the configured seed source and read the seed
pub fn resolve_seed(config: &StackConfigManifest) -> Result<SecretSeed> {
    let source = config.spec.seed_source()?.ok_or_else(|| {
        SecretError::MissingSeed(
            "no seed source configured (set spec.seed or TELESTACK_SEED)".to_string(),
        )
    })?;
    let seed = load_seed(&source).with_context(|| format!("Failed to load seed from {}", source))?;
    Ok(seed)
}

/// Configuration plus seed, turned into a validated plan
pub fn build_plan(config: &StackConfigManifest) -> Result<DeploymentPlan> {
    let seed = resolve_seed(config)?;
    let plan =
        DeploymentPlan::build(&config.spec, &seed).context("Failed to build deployment plan")?;
    Ok(plan)
}
