// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stack status command

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use telestack_core::application::ManifestBuilder;
use telestack_core::domain::runtime::{ServiceStatus, StackRuntime};
use telestack_core::infrastructure::DockerComposeRuntime;

use super::load_config;

pub async fn status(config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let spec = &config.spec;

    let services: Vec<String> = ManifestBuilder::new(spec)
        .build()
        .context("Failed to build service manifests")?
        .into_iter()
        .map(|m| m.service_name)
        .collect();

    let runtime = DockerComposeRuntime::new(
        spec.runtime.docker_socket_path.clone(),
        spec.runtime.compose_command.clone(),
    )?;
    runtime.healthcheck().await?;

    let statuses = runtime.status(&spec.project, &services).await?;

    println!("{} {}", "Stack".bold(), spec.project.bold());
    for status in &statuses {
        println!(
            "  {:<12} {:<24} {}",
            status.service,
            status.container.dimmed(),
            describe(status)
        );
    }

    let running = statuses.iter().filter(|s| s.is_running()).count();
    println!();
    println!("{}/{} services running", running, statuses.len());
    Ok(())
}

fn describe(status: &ServiceStatus) -> String {
    let state = match status.state.as_str() {
        "running" => status.state.green(),
        "absent" => status.state.dimmed(),
        _ => status.state.yellow(),
    };
    match &status.health {
        Some(health) => format!("{} ({})", state, health),
        None => state.to_string(),
    }
}
