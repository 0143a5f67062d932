// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{container_name, RuntimeError, ServiceStatus, StackRuntime};
use async_trait::async_trait;
use bollard::Docker;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

pub struct DockerComposeRuntime {
    docker: Docker,
    compose_command: Vec<String>,
}

impl DockerComposeRuntime {
    pub fn new(
        socket_path: Option<String>,
        compose_command: Vec<String>,
    ) -> Result<Self, RuntimeError> {
        if compose_command.is_empty() {
            return Err(RuntimeError::Command("compose command cannot be empty".to_string()));
        }

        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION).map_err(|e| {
                RuntimeError::Connection(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Connection(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\n\
                     Try:\n\
                     - Start Docker: systemctl start docker\n\
                     - Check permissions: ls -la /var/run/docker.sock",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            compose_command,
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(|e| {
            RuntimeError::Connection(format!(
                "Cannot connect to Docker daemon: {}\n\n\
                 Verify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    async fn inspect(&self, project: &str, service: &str) -> Result<ServiceStatus, RuntimeError> {
        let container = container_name(project, service);

        match self.docker.inspect_container(&container, None).await {
            Ok(details) => {
                let state = details.state.as_ref();
                let status = state
                    .and_then(|s| s.status.as_ref())
                    .map(|s| format!("{:?}", s).to_lowercase())
                    .unwrap_or_else(|| "unknown".to_string());
                let health = state
                    .and_then(|s| s.health.as_ref())
                    .and_then(|h| h.status.as_ref())
                    .map(|h| format!("{:?}", h).to_lowercase());

                Ok(ServiceStatus {
                    service: service.to_string(),
                    container,
                    state: status,
                    health,
                })
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(ServiceStatus::absent(service, container)),
            Err(e) => Err(RuntimeError::Inspect {
                container,
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl StackRuntime for DockerComposeRuntime {
    /// Hand the compose file to the runtime; startup order follows its
    /// `depends_on` conditions
    async fn up(&self, project: &str, compose_file: &Path) -> Result<(), RuntimeError> {
        let (program, base_args) = self
            .compose_command
            .split_first()
            .ok_or_else(|| RuntimeError::Command("compose command cannot be empty".to_string()))?;

        info!(project, file = %compose_file.display(), "Starting stack");

        let output = Command::new(program)
            .args(base_args)
            .arg("--project-name")
            .arg(project)
            .arg("--file")
            .arg(compose_file)
            .args(["up", "--detach", "--remove-orphans"])
            .output()
            .await
            .map_err(|e| RuntimeError::Command(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Command(stderr.trim().to_string()));
        }

        debug!(project, "Compose up finished");
        Ok(())
    }

    async fn status(
        &self,
        project: &str,
        services: &[String],
    ) -> Result<Vec<ServiceStatus>, RuntimeError> {
        let mut statuses = Vec::with_capacity(services.len());
        for service in services {
            statuses.push(self.inspect(project, service).await?);
        }
        Ok(statuses)
    }
}
