// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Manifest Types
//!
//! Runtime-agnostic description of one container: image, ports, volumes,
//! env file reference, capability restrictions, health check and dependency
//! edges. Manifests are recomputed from configuration on every build and are
//! never persisted as their own objects.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Manifest value objects and construction errors

use crate::domain::dependency::{DependencyError, DependsOn};
use crate::domain::env_file::EnvFileError;
use crate::domain::identity::{IdentityError, ServiceIdentity};
use crate::domain::image::{ImageError, ImageReference};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Missing required configuration field: {field}")]
    MissingConfiguration { field: String },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Host port {port} is bound by more than one service: {}", services.join(", "))]
    PortCollision { port: u16, services: Vec<String> },

    #[error(
        "Environment variable {name} for service '{service}' is generated and cannot be overridden"
    )]
    DuplicateVariable { service: String, name: String },

    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    EnvFile(#[from] EnvFileError),
}

impl ManifestError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Role of a service in the stack; selects its composition rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Database,
    Application,
    Dashboard,
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => f.write_str("database"),
            Self::Application => f.write_str("application"),
            Self::Dashboard => f.write_str("dashboard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host_path: PathBuf,
    pub container_path: String,
    pub owner: ServiceIdentity,
}

/// Readiness probe executed by the runtime
///
/// Failures during `start_period` don't count; after `retries` consecutive
/// failures the container is unhealthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub start_period: Duration,
}

/// Linux capability restrictions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub drop: Vec<String>,
    pub add: Vec<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::none()
    }
}

impl Capabilities {
    /// Drop everything, add nothing
    pub fn none() -> Self {
        Self {
            drop: vec!["ALL".to_string()],
            add: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub service_name: String,
    pub role: ServiceRole,
    pub image: ImageReference,
    pub identity: ServiceIdentity,
    pub ports: Vec<PortBinding>,
    pub environment_file: PathBuf,
    pub volumes: Vec<VolumeBinding>,
    pub depends_on: Vec<DependsOn>,
    pub capabilities: Capabilities,
    pub health_check: Option<HealthCheck>,
}

impl ServiceManifest {
    pub fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().map(|p| p.host_port)
    }
}
