// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment commands
//!
//! Commands: plan, render, apply

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use telestack_core::application::{ApplyReport, Deployer, DeploymentPlan, ManifestBuilder};
use telestack_core::domain::change::Change;
use telestack_core::domain::dependency::DependencyCondition;
use telestack_core::domain::runtime::{ManifestPublisher, StackRuntime};
use telestack_core::infrastructure::host_fs::running_as_root;
use telestack_core::infrastructure::{
    ComposeDocument, ComposeFileWriter, DockerComposeRuntime, LocalEnvFileWriter,
    LocalStatePaths, OwnershipMode, SystemAccounts,
};

use super::{build_plan, load_config};

#[derive(Args)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Write the compose document here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Start the stack after provisioning (`compose up`)
    #[arg(long)]
    pub up: bool,

    /// Write apply metrics in Prometheus text format to this file
    #[arg(long, value_name = "FILE")]
    pub metrics_textfile: Option<PathBuf>,

    /// Allow running without root: ownership is not changed and accounts
    /// are not created
    #[arg(long)]
    pub unprivileged: bool,
}

pub async fn plan(config_override: Option<PathBuf>, args: PlanArgs) -> Result<()> {
    let config = load_config(config_override)?;
    let plan = build_plan(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan_summary(&plan))?);
        return Ok(());
    }

    println!("{} {}", "Deployment plan for".bold(), plan.project.bold());
    println!();

    println!("{}", "Startup order:".bold());
    for (index, manifest) in plan.manifests.iter().enumerate() {
        println!(
            "  {}. {} ({}) as {} [{}]",
            index + 1,
            manifest.service_name.bold(),
            manifest.role,
            manifest.identity.user_spec(),
            manifest.image
        );
        for dep in &manifest.depends_on {
            let condition = match dep.condition {
                DependencyCondition::Healthy => "healthy",
                DependencyCondition::Started => "started",
            };
            println!("       after {} is {}", dep.service, condition);
        }
        for port in &manifest.ports {
            println!("       port {} → {}", port.host_port, port.container_port);
        }
    }
    println!();

    println!("{}", "State directories:".bold());
    for state in &plan.state_paths {
        println!(
            "  {} ({}, {:o})",
            state.path.display(),
            state.owner.user_spec(),
            state.mode
        );
    }
    println!();

    println!("{}", "Env files:".bold());
    for file in &plan.env_files {
        let names: Vec<_> = file.variable_names().collect();
        println!("  {}: {}", file.path().display(), names.join(", ").dimmed());
    }
    println!();

    println!("{} {}", "Compose file:".bold(), plan.compose_file.display());
    Ok(())
}

/// Plan without any secret values
pub fn plan_summary(plan: &DeploymentPlan) -> serde_json::Value {
    serde_json::json!({
        "project": plan.project,
        "compose_file": plan.compose_file,
        "services": plan.manifests.iter().map(|m| serde_json::json!({
            "name": m.service_name,
            "role": m.role,
            "image": m.image.to_string(),
            "user": m.identity.user_spec(),
            "ports": m.ports,
            "depends_on": m.depends_on,
            "env_file": m.environment_file,
        })).collect::<Vec<_>>(),
        "state_paths": plan.state_paths.iter().map(|s| serde_json::json!({
            "path": s.path,
            "owner": s.owner.user_spec(),
            "mode": format!("{:o}", s.mode),
        })).collect::<Vec<_>>(),
        "edges": plan.dependency_edges().iter().map(|(dependent, dep)| serde_json::json!({
            "from": dependent,
            "to": dep.service,
            "condition": dep.condition,
        })).collect::<Vec<_>>(),
        "env_files": plan.env_files.iter().map(|f| serde_json::json!({
            "service": f.service_name(),
            "path": f.path(),
            "variables": f.variable_names().collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

pub async fn render(config_override: Option<PathBuf>, args: RenderArgs) -> Result<()> {
    let config = load_config(config_override)?;
    let manifests = ManifestBuilder::new(&config.spec)
        .build()
        .context("Failed to build service manifests")?;

    match args.output {
        Some(path) => {
            let change = ComposeFileWriter
                .publish(&config.spec.project, &manifests, &path)
                .with_context(|| format!("Failed to write compose file to {:?}", path))?;
            println!(
                "{}",
                format!("✓ Compose file rendered ({}): {}", change, path.display()).green()
            );
        }
        None => print!(
            "{}",
            ComposeDocument::from_manifests(&config.spec.project, &manifests).to_yaml()?
        ),
    }
    Ok(())
}

pub async fn apply(config_override: Option<PathBuf>, args: ApplyArgs) -> Result<()> {
    let metrics = match &args.metrics_textfile {
        Some(_) => Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install metrics recorder")?,
        ),
        None => None,
    };

    let result = run_apply(config_override, &args).await;

    if let (Some(handle), Some(path)) = (&metrics, &args.metrics_textfile) {
        write_metrics(handle, path)?;
    }
    result
}

async fn run_apply(config_override: Option<PathBuf>, args: &ApplyArgs) -> Result<()> {
    let config = load_config(config_override)?;

    let ownership = if running_as_root() {
        OwnershipMode::Enforce
    } else if args.unprivileged {
        warn!("Running unprivileged: ownership is not changed and accounts are not created");
        OwnershipMode::Skip
    } else {
        anyhow::bail!(
            "apply must run as root to create service accounts and set ownership \
             (use --unprivileged to skip both)"
        );
    };

    let plan = build_plan(&config)?;
    let state_paths = Arc::new(LocalStatePaths::new(ownership));
    let env_files = Arc::new(LocalEnvFileWriter::new(ownership));
    let publisher = Arc::new(ComposeFileWriter);
    let deployer = match ownership {
        OwnershipMode::Enforce => Deployer::new(
            Arc::new(SystemAccounts::new()),
            state_paths,
            env_files,
            publisher,
        ),
        OwnershipMode::Skip => Deployer::without_accounts(state_paths, env_files, publisher),
    };

    let report = deployer.apply(&plan).context("Deployment failed")?;
    print_report(&report);

    if args.up {
        let runtime = DockerComposeRuntime::new(
            config.spec.runtime.docker_socket_path.clone(),
            config.spec.runtime.compose_command.clone(),
        )?;
        runtime.up(&plan.project, &plan.compose_file).await?;
        println!("{}", format!("✓ Stack {} started", plan.project).green());
    }

    Ok(())
}

fn print_report(report: &ApplyReport) {
    for artifact in &report.artifacts {
        let marker = match artifact.change {
            Change::Created => "+".green(),
            Change::Updated => "~".yellow(),
            Change::Unchanged => "=".dimmed(),
        };
        println!("  {} {:<16} {}", marker, artifact.kind.as_str(), artifact.name);
    }
    println!();

    if report.is_noop() {
        println!("{}", "✓ Host already up to date".green());
    } else {
        println!(
            "{}",
            format!(
                "✓ Applied: {} created, {} updated, {} unchanged",
                report.count(Change::Created),
                report.count(Change::Updated),
                report.count(Change::Unchanged)
            )
            .green()
        );
    }
}

fn write_metrics(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    std::fs::write(path, handle.render())
        .with_context(|| format!("Failed to write metrics to {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use telestack_core::domain::secret::SecretSeed;
    use telestack_core::domain::stack_config::StackConfigSpec;

    #[tokio::test]
    async fn test_render_output_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("telestack.yaml");
        std::fs::write(
            &config_path,
            "apiVersion: telestack.io/v1\n\
             kind: StackConfig\n\
             metadata:\n  name: test-host\n\
             spec:\n  state_path: /var/lib/tm\n\
             \x20 mqtt:\n    host: broker.local\n    username: u\n    password: p\n",
        )
        .unwrap();
        let output = dir.path().join("out/compose.yaml");

        render(
            Some(config_path),
            RenderArgs {
                output: Some(output.clone()),
            },
        )
        .await
        .unwrap();

        let mode = std::fs::metadata(&output).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let rendered = std::fs::read_to_string(&output).unwrap();
        assert!(rendered.starts_with("# Generated by telestack"));
        assert!(!rendered.contains("password"));
    }

    #[test]
    fn test_plan_summary_has_no_secrets() {
        let mut spec = StackConfigSpec::default();
        spec.mqtt.host = Some("broker.local".to_string());
        spec.mqtt.username = Some("u".to_string());
        spec.mqtt.password = Some("mqtt-password-value".to_string());
        let seed = SecretSeed::new(b"S1".to_vec()).unwrap();
        let plan = DeploymentPlan::build(&spec, &seed).unwrap();

        let json = plan_summary(&plan).to_string();
        assert!(json.contains("MQTT_PASSWORD"));
        assert!(!json.contains("mqtt-password-value"));
        assert!(!json.contains("3bd80802d3ec92e80b35f85cee2eced0ecafdbd3f5feb7e1b7a4d9b94bbf83bf"));
        let summary = plan_summary(&plan);
        assert_eq!(summary["services"].as_array().unwrap().len(), 3);
        assert_eq!(summary["edges"].as_array().unwrap().len(), 2);
    }
}
