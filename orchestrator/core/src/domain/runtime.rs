// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::change::Change;
use crate::domain::manifest::ServiceManifest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to render compose document: {0}")]
    Render(String),
    #[error("Failed to write {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to connect to container runtime: {0}")]
    Connection(String),
    #[error("Compose command failed: {0}")]
    Command(String),
    #[error("Failed to inspect container {container}: {reason}")]
    Inspect { container: String, reason: String },
}

/// Container name of a service inside a project
pub fn container_name(project: &str, service: &str) -> String {
    format!("{}-{}", project, service)
}

/// Observed state of one service container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub container: String,
    /// "running", "exited", ... or "absent" when no container exists
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl ServiceStatus {
    pub fn absent(service: &str, container: String) -> Self {
        Self {
            service: service.to_string(),
            container,
            state: "absent".to_string(),
            health: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Writes the runtime-specific rendering of a set of manifests
pub trait ManifestPublisher: Send + Sync {
    fn publish(
        &self,
        project: &str,
        manifests: &[ServiceManifest],
        path: &Path,
    ) -> Result<Change, RuntimeError>;
}

/// Container runtime that starts a published stack and reports on it
#[async_trait]
pub trait StackRuntime: Send + Sync {
    async fn up(&self, project: &str, compose_file: &Path) -> Result<(), RuntimeError>;
    async fn status(
        &self,
        project: &str,
        services: &[String],
    ) -> Result<Vec<ServiceStatus>, RuntimeError>;
}
