// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deployment pipeline
//!
//! [`DeploymentPlan::build`] is pure: it derives secrets, composes env files
//! and manifests and performs every validation. [`Deployer::apply`] then
//! realizes the plan on the host in a fixed order:
//!
//! 1. shared group and service accounts
//! 2. state directories
//! 3. env files
//! 4. compose file
//!
//! Every step is idempotent, so re-applying an unchanged plan reports
//! nothing but `unchanged` artifacts.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Plan / apply orchestration and its report

use crate::application::environment;
use crate::application::manifest_builder::ManifestBuilder;
use crate::domain::change::Change;
use crate::domain::dependency::DependsOn;
use crate::domain::env_file::{EnvFileError, EnvFileMaterializer, EnvironmentFile};
use crate::domain::identity::{HostAccounts, IdentityError, IdentityProvisioner, IdentityTable};
use crate::domain::manifest::{ManifestError, ServiceManifest};
use crate::domain::runtime::{ManifestPublisher, RuntimeError};
use crate::domain::secret::{SecretError, SecretSeed, StackSecrets};
use crate::domain::stack_config::StackConfigSpec;
use crate::domain::state_path::{ProvisionError, StatePath, StatePathProvisioner};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Everything a deployment needs, computed without touching the host
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub project: String,
    pub identities: IdentityTable,
    pub manifests: Vec<ServiceManifest>,
    pub env_files: Vec<EnvironmentFile>,
    pub state_paths: Vec<StatePath>,
    pub compose_file: PathBuf,
}

impl DeploymentPlan {
    /// # Errors
    /// Any configuration, secret or dependency error; nothing has been
    /// written when this fails.
    pub fn build(spec: &StackConfigSpec, seed: &SecretSeed) -> Result<Self, DeployError> {
        let secrets = StackSecrets::derive(seed)?;
        let builder = ManifestBuilder::new(spec);
        let manifests = builder.build()?;
        let mut environments = environment::compose(spec, &secrets)?;

        let mut env_files = Vec::with_capacity(manifests.len());
        let mut state_paths = Vec::new();
        for manifest in &manifests {
            let variables = environments
                .remove(&manifest.service_name)
                .unwrap_or_default();
            env_files.push(
                EnvironmentFile::new(
                    manifest.service_name.clone(),
                    manifest.environment_file.clone(),
                    variables,
                )
                .map_err(ManifestError::from)?,
            );
            state_paths.extend(
                manifest
                    .volumes
                    .iter()
                    .map(|v| StatePath::new(v.host_path.clone(), v.owner.clone())),
            );
        }

        Ok(Self {
            project: spec.project.clone(),
            identities: spec.identities.clone(),
            manifests,
            env_files,
            state_paths,
            compose_file: spec.compose_file.clone(),
        })
    }

    /// Services in startup order
    pub fn service_names(&self) -> Vec<String> {
        self.manifests.iter().map(|m| m.service_name.clone()).collect()
    }

    /// `(dependent, dependency)` edges of all manifests
    pub fn dependency_edges(&self) -> Vec<(String, DependsOn)> {
        self.manifests
            .iter()
            .flat_map(|m| {
                m.depends_on
                    .iter()
                    .map(move |d| (m.service_name.clone(), d.clone()))
            })
            .collect()
    }

    pub fn env_file(&self, service: &str) -> Option<&EnvironmentFile> {
        self.env_files.iter().find(|f| f.service_name() == service)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Group,
    Account,
    StateDirectory,
    EnvFile,
    ComposeFile,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Account => "account",
            Self::StateDirectory => "state_directory",
            Self::EnvFile => "env_file",
            Self::ComposeFile => "compose_file",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedArtifact {
    pub kind: ArtifactKind,
    pub name: String,
    pub change: Change,
}

/// Per-artifact outcome of an apply, in the order artifacts were handled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub artifacts: Vec<AppliedArtifact>,
}

impl ApplyReport {
    fn record(&mut self, kind: ArtifactKind, name: impl Into<String>, change: Change) {
        metrics::counter!(
            "telestack_artifacts_total",
            "kind" => kind.as_str(),
            "change" => change.as_str()
        )
        .increment(1);

        self.artifacts.push(AppliedArtifact {
            kind,
            name: name.into(),
            change,
        });
    }

    pub fn changed(&self) -> impl Iterator<Item = &AppliedArtifact> {
        self.artifacts.iter().filter(|a| a.change.is_change())
    }

    /// True when the host already matched the plan
    pub fn is_noop(&self) -> bool {
        self.changed().next().is_none()
    }

    pub fn count(&self, change: Change) -> usize {
        self.artifacts.iter().filter(|a| a.change == change).count()
    }
}

/// Applies a plan through the host adapters
pub struct Deployer {
    /// `None` leaves host accounts alone (unprivileged runs)
    accounts: Option<Arc<dyn HostAccounts>>,
    state_paths: Arc<dyn StatePathProvisioner>,
    env_files: Arc<dyn EnvFileMaterializer>,
    publisher: Arc<dyn ManifestPublisher>,
}

impl Deployer {
    pub fn new(
        accounts: Arc<dyn HostAccounts>,
        state_paths: Arc<dyn StatePathProvisioner>,
        env_files: Arc<dyn EnvFileMaterializer>,
        publisher: Arc<dyn ManifestPublisher>,
    ) -> Self {
        Self {
            accounts: Some(accounts),
            state_paths,
            env_files,
            publisher,
        }
    }

    /// Deployer that does not touch host accounts; group and account steps
    /// are left out of the report
    pub fn without_accounts(
        state_paths: Arc<dyn StatePathProvisioner>,
        env_files: Arc<dyn EnvFileMaterializer>,
        publisher: Arc<dyn ManifestPublisher>,
    ) -> Self {
        Self {
            accounts: None,
            state_paths,
            env_files,
            publisher,
        }
    }

    /// Realize `plan` on the host
    ///
    /// Stops at the first failing step. Steps already completed stay in
    /// place and are reported `unchanged` by the next apply.
    pub fn apply(&self, plan: &DeploymentPlan) -> Result<ApplyReport, DeployError> {
        let started = Instant::now();
        let result = self.apply_steps(plan);

        metrics::histogram!("telestack_apply_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => {
                metrics::counter!("telestack_apply_total", "outcome" => "success").increment(1);
                info!(
                    project = %plan.project,
                    changed = report.changed().count(),
                    total = report.artifacts.len(),
                    "Applied deployment plan"
                );
            }
            Err(e) => {
                metrics::counter!("telestack_apply_total", "outcome" => "failure").increment(1);
                warn!(project = %plan.project, error = %e, "Deployment apply failed");
            }
        }
        result
    }

    fn apply_steps(&self, plan: &DeploymentPlan) -> Result<ApplyReport, DeployError> {
        let mut report = ApplyReport::default();

        match &self.accounts {
            Some(accounts) => {
                let identities = IdentityProvisioner::new(&plan.identities, accounts.as_ref());
                report.record(
                    ArtifactKind::Group,
                    plan.identities.group.name.clone(),
                    identities.ensure_group()?,
                );
                for manifest in &plan.manifests {
                    let (identity, change) = identities.provision(&manifest.service_name)?;
                    report.record(ArtifactKind::Account, identity.name, change);
                }
            }
            None => {
                debug!(
                    group = %plan.identities.group.name,
                    "Skipping host account provisioning"
                );
            }
        }

        for state in &plan.state_paths {
            let change = self.state_paths.ensure(&state.path, &state.owner, state.mode)?;
            report.record(
                ArtifactKind::StateDirectory,
                state.path.display().to_string(),
                change,
            );
        }

        for manifest in &plan.manifests {
            let Some(file) = plan.env_file(&manifest.service_name) else {
                continue;
            };
            let change = self.env_files.materialize(file, &manifest.identity)?;
            report.record(ArtifactKind::EnvFile, file.path().display().to_string(), change);
        }

        let change = self
            .publisher
            .publish(&plan.project, &plan.manifests, &plan.compose_file)?;
        report.record(
            ArtifactKind::ComposeFile,
            plan.compose_file.display().to_string(),
            change,
        );

        Ok(report)
    }
}
