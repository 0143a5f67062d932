// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Compose rendering
//!
//! Translates service manifests into a compose document. The document
//! references env files by path only, so it carries no secret values.

use crate::domain::change::Change;
use crate::domain::dependency::DependencyCondition;
use crate::domain::manifest::{HealthCheck, ServiceManifest};
use crate::domain::runtime::{container_name, ManifestPublisher, RuntimeError};
use crate::infrastructure::host_fs::{ensure_dir, observe, permission_bits, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const HEADER: &str = "# Generated by telestack. Changes are overwritten on the next apply.\n";
const COMPOSE_FILE_MODE: u32 = 0o600;
const RESTART_POLICY: &str = "unless-stopped";
const NO_NEW_PRIVILEGES: &str = "no-new-privileges:true";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDocument {
    pub name: String,
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: String,
    pub container_name: String,
    pub user: String,
    pub restart: String,
    pub env_file: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, ComposeDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthcheck>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_opt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeDependency {
    pub condition: String,
}

/// Durations are written in the unspaced form Compose accepts (`90s`, `1500ms`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeHealthcheck {
    pub test: Vec<String>,
    #[serde(with = "compose_duration")]
    pub interval: Duration,
    #[serde(with = "compose_duration")]
    pub timeout: Duration,
    pub retries: u32,
    #[serde(with = "compose_duration")]
    pub start_period: Duration,
}

/// Single-unit duration string: whole seconds, else milliseconds, else
/// microseconds, else nanoseconds
fn format_compose_duration(duration: &Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos % 1_000_000_000 == 0 {
        format!("{}s", duration.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", duration.as_micros())
    } else {
        format!("{}ns", nanos)
    }
}

mod compose_duration {
    use super::format_compose_duration;
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_compose_duration(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        humantime_serde::deserialize(deserializer)
    }
}

impl From<&HealthCheck> for ComposeHealthcheck {
    fn from(check: &HealthCheck) -> Self {
        Self {
            test: check.test.clone(),
            interval: check.interval,
            timeout: check.timeout,
            retries: check.retries,
            start_period: check.start_period,
        }
    }
}

fn condition(condition: DependencyCondition) -> String {
    match condition {
        DependencyCondition::Started => "service_started",
        DependencyCondition::Healthy => "service_healthy",
    }
    .to_string()
}

impl ComposeService {
    fn from_manifest(project: &str, manifest: &ServiceManifest) -> Self {
        Self {
            image: manifest.image.to_string(),
            container_name: container_name(project, &manifest.service_name),
            user: manifest.identity.user_spec(),
            restart: RESTART_POLICY.to_string(),
            env_file: vec![manifest.environment_file.display().to_string()],
            ports: manifest
                .ports
                .iter()
                .map(|p| format!("{}:{}", p.host_port, p.container_port))
                .collect(),
            volumes: manifest
                .volumes
                .iter()
                .map(|v| format!("{}:{}", v.host_path.display(), v.container_path))
                .collect(),
            depends_on: manifest
                .depends_on
                .iter()
                .map(|d| {
                    (
                        d.service.clone(),
                        ComposeDependency {
                            condition: condition(d.condition),
                        },
                    )
                })
                .collect(),
            healthcheck: manifest.health_check.as_ref().map(ComposeHealthcheck::from),
            cap_drop: manifest.capabilities.drop.clone(),
            cap_add: manifest.capabilities.add.clone(),
            security_opt: vec![NO_NEW_PRIVILEGES.to_string()],
        }
    }
}

impl ComposeDocument {
    pub fn from_manifests(project: &str, manifests: &[ServiceManifest]) -> Self {
        Self {
            name: project.to_string(),
            services: manifests
                .iter()
                .map(|m| (m.service_name.clone(), ComposeService::from_manifest(project, m)))
                .collect(),
        }
    }

    /// Render as YAML, prefixed with a generated-file header
    pub fn to_yaml(&self) -> Result<String, RuntimeError> {
        let body = serde_yaml::to_string(self).map_err(|e| RuntimeError::Render(e.to_string()))?;
        Ok(format!("{}{}", HEADER, body))
    }
}

/// Writes the compose document to disk, replacing it atomically
#[derive(Debug, Clone, Default)]
pub struct ComposeFileWriter;

impl ManifestPublisher for ComposeFileWriter {
    fn publish(
        &self,
        project: &str,
        manifests: &[ServiceManifest],
        path: &Path,
    ) -> Result<Change, RuntimeError> {
        let rendered = ComposeDocument::from_manifests(project, manifests).to_yaml()?;
        let io_err = |source| RuntimeError::Publish {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent, 0o755).map_err(io_err)?;
        }

        let existing = observe(path).map_err(io_err)?;
        if let Some(meta) = &existing {
            if meta.is_file()
                && permission_bits(meta) == COMPOSE_FILE_MODE
                && std::fs::read(path).map_err(io_err)? == rendered.as_bytes()
            {
                debug!(path = %path.display(), "Compose file unchanged");
                return Ok(Change::Unchanged);
            }
        }

        write_atomic(path, rendered.as_bytes(), COMPOSE_FILE_MODE, None).map_err(io_err)?;
        let change = if existing.is_some() {
            Change::Updated
        } else {
            Change::Created
        };
        info!(
            path = %path.display(),
            services = manifests.len(),
            change = %change,
            "Published compose file"
        );
        Ok(change)
    }
}
