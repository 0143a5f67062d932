// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Stack Configuration Types
//
// Defines the configuration schema for a telestack host, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Host paths (state root, env file directory, compose file)
// - Published ports and MQTT broker parameters
// - Image references and the service identity table
// - Per-service overrides (extra environment, extra dependency edges)

use crate::domain::dependency::DependsOn;
use crate::domain::identity::IdentityTable;
use crate::domain::secret::SeedSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "telestack.io/v1";
pub const KIND: &str = "StackConfig";

/// Top-level Kubernetes-style stack configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfigManifest {
    /// API version (must be "telestack.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "StackConfig")
    pub kind: String,

    /// Host metadata (name, labels)
    pub metadata: ManifestMetadata,

    /// Stack specification
    pub spec: StackConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable host name
    pub name: String,

    /// Optional: Labels for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Stack specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfigSpec {
    /// Compose project name, also the container name prefix
    #[serde(default = "default_project")]
    pub project: String,

    /// Root of the per-service state directories
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Directory holding one env file per service
    #[serde(default = "default_env_dir")]
    pub env_dir: PathBuf,

    /// Where the rendered compose document is written
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Host port of the web application
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host port of the dashboard
    #[serde(default = "default_grafana_port")]
    pub grafana_port: u16,

    /// Seed source: "file:<path>" or "env:<VAR>"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,

    /// MQTT broker the application publishes to
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    /// Service to account table (uids) plus the shared group
    #[serde(default)]
    pub identities: IdentityTable,

    /// Per-service overrides keyed by service name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, ServiceOverrides>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// MQTT connection parameters, passed verbatim to the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Database role used by application and dashboard
    #[serde(default = "default_db_user")]
    pub user: String,

    /// Publish the database on this host port (default: not published)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Readiness probe timing for the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_start_period", with = "humantime_serde")]
    pub start_period: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_database_image")]
    pub database: String,

    #[serde(default = "default_application_image")]
    pub application: String,

    #[serde(default = "default_dashboard_image")]
    pub dashboard: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceOverrides {
    /// Additional non-secret environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,

    /// Additional dependency edges on top of the fixed ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependsOn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to Docker socket
    /// Default: auto-detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Command used to hand the compose file to the runtime
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_mqtt_port(),
            username: None,
            password: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
            user: default_db_user(),
            host_port: None,
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            start_period: default_start_period(),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            database: default_database_image(),
            application: default_application_image(),
            dashboard: default_dashboard_image(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket_path: None,
            compose_command: default_compose_command(),
        }
    }
}

impl Default for StackConfigSpec {
    fn default() -> Self {
        Self {
            project: default_project(),
            state_path: default_state_path(),
            env_dir: default_env_dir(),
            compose_file: default_compose_file(),
            port: default_port(),
            grafana_port: default_grafana_port(),
            seed: None,
            mqtt: MqttConfig::default(),
            database: DatabaseConfig::default(),
            images: ImagesConfig::default(),
            identities: IdentityTable::default(),
            services: BTreeMap::new(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for StackConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "telestack-host".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: StackConfigSpec::default(),
        }
    }
}

impl StackConfigSpec {
    /// Parsed seed source, if one is configured
    pub fn seed_source(&self) -> anyhow::Result<Option<SeedSource>> {
        self.seed
            .as_deref()
            .map(|s| s.parse::<SeedSource>().map_err(anyhow::Error::from))
            .transpose()
    }

    pub fn overrides(&self, service: &str) -> Option<&ServiceOverrides> {
        self.services.get(service)
    }
}

impl StackConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TELESTACK_CONFIG_PATH environment variable
    /// 2. ./telestack.yaml (working directory)
    /// 3. ~/.telestack/config.yaml (user home)
    /// 4. /etc/telestack/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TELESTACK_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./telestack.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".telestack").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/telestack/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(seed) = lookup("TELESTACK_SEED") {
            tracing::info!("Environment override: TELESTACK_SEED");
            self.spec.seed = Some(seed);
        }

        if let Some(path) = lookup("TELESTACK_STATE_PATH") {
            tracing::info!("Environment override: TELESTACK_STATE_PATH={}", path);
            self.spec.state_path = PathBuf::from(path);
        }

        // Value is never logged
        if let Some(password) = lookup("TELESTACK_MQTT_PASSWORD") {
            tracing::info!("Environment override: TELESTACK_MQTT_PASSWORD");
            self.spec.mqtt.password = Some(password);
        }
    }

    /// Validate the manifest envelope and the parts checkable without building
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let project = &self.spec.project;
        if project.is_empty()
            || !project
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "spec.project '{}' must be non-empty lowercase letters, digits, '-' or '_'",
                project
            );
        }

        for (field, path) in [
            ("spec.state_path", &self.spec.state_path),
            ("spec.env_dir", &self.spec.env_dir),
            ("spec.compose_file", &self.spec.compose_file),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path, got {:?}", field, path);
            }
        }

        self.spec.identities.validate()?;
        self.spec.seed_source()?;

        if self.spec.runtime.compose_command.is_empty() {
            anyhow::bail!("spec.runtime.compose_command cannot be empty");
        }

        Ok(())
    }
}

// Default value functions
fn default_project() -> String {
    "telestack".to_string()
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/teslamate")
}

fn default_env_dir() -> PathBuf {
    PathBuf::from("/run/telestack/env")
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("/run/telestack/compose.yaml")
}

fn default_port() -> u16 {
    4000
}

fn default_grafana_port() -> u16 {
    3000
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_db_name() -> String {
    "teslamate".to_string()
}

fn default_db_user() -> String {
    "teslamate".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    5
}

fn default_start_period() -> Duration {
    Duration::from_secs(30)
}

fn default_database_image() -> String {
    "postgres:16".to_string()
}

fn default_application_image() -> String {
    "teslamate/teslamate:latest".to_string()
}

fn default_dashboard_image() -> String {
    "teslamate/grafana:latest".to_string()
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}
