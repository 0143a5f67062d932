// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Manifest Builder
//!
//! Pure function from stack configuration to the three service manifests.
//! Applies the fixed composition rules:
//!
//! - **database** (`postgres`): persistent data volume, credentials from its
//!   env file, readiness probe with interval / timeout / retries / start period
//! - **application** (`teslamate`): starts only after the database is healthy,
//!   publishes its web port, all capabilities dropped
//! - **dashboard** (`grafana`): starts after the application, publishes its
//!   port, persistent state volume
//!
//! Every error is raised here, before anything is written or started.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Config → manifest composition and validation

use crate::domain::dependency::{DependencyGraph, DependsOn};
use crate::domain::identity::ServiceIdentity;
use crate::domain::image::ImageReference;
use crate::domain::manifest::{
    Capabilities, HealthCheck, ManifestError, PortBinding, ServiceManifest, ServiceRole,
    VolumeBinding,
};
use crate::domain::stack_config::StackConfigSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

pub const DATABASE_SERVICE: &str = "postgres";
pub const APPLICATION_SERVICE: &str = "teslamate";
pub const DASHBOARD_SERVICE: &str = "grafana";

const DATABASE_CONTAINER_PORT: u16 = 5432;
const APPLICATION_CONTAINER_PORT: u16 = 4000;
const DASHBOARD_CONTAINER_PORT: u16 = 3000;

const DATABASE_DATA_DIR: &str = "/var/lib/postgresql/data";
const DASHBOARD_DATA_DIR: &str = "/var/lib/grafana";

/// Service name for each role, in dependency order
pub const SERVICES: [(ServiceRole, &str); 3] = [
    (ServiceRole::Database, DATABASE_SERVICE),
    (ServiceRole::Application, APPLICATION_SERVICE),
    (ServiceRole::Dashboard, DASHBOARD_SERVICE),
];

pub struct ManifestBuilder<'a> {
    spec: &'a StackConfigSpec,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(spec: &'a StackConfigSpec) -> Self {
        Self { spec }
    }

    /// Env file path of a service: `<env_dir>/<service>.env`
    pub fn env_file_path(&self, service: &str) -> PathBuf {
        self.spec.env_dir.join(format!("{}.env", service))
    }

    /// State directory of a service: `<state_path>/<service>`
    pub fn state_dir(&self, service: &str) -> PathBuf {
        self.spec.state_path.join(service)
    }

    /// Build all manifests in startup order
    ///
    /// # Errors
    /// - `ManifestError::MissingConfiguration` for absent required fields
    /// - `ManifestError::InvalidConfiguration` for out-of-range values
    /// - `ManifestError::InvalidImage` for unresolvable image references
    /// - `ManifestError::PortCollision` when two services share a host port
    /// - `ManifestError::Dependency` when the dependency edges contain a cycle
    pub fn build(&self) -> Result<Vec<ServiceManifest>, ManifestError> {
        self.check_required()?;

        let mut manifests = vec![self.database()?, self.application()?, self.dashboard()?];

        for manifest in &mut manifests {
            if let Some(overrides) = self.spec.overrides(&manifest.service_name) {
                manifest.depends_on.extend(overrides.depends_on.iter().cloned());
            }
        }

        check_port_collisions(&manifests)?;

        let graph = DependencyGraph::build(
            manifests
                .iter()
                .map(|m| (m.service_name.as_str(), m.depends_on.as_slice())),
        )?;

        let mut ordered = Vec::with_capacity(manifests.len());
        for name in graph.startup_order() {
            if let Some(index) = manifests.iter().position(|m| &m.service_name == name) {
                let mut manifest = manifests.swap_remove(index);
                manifest.depends_on = graph.dependencies(name).to_vec();
                ordered.push(manifest);
            }
        }

        debug!(order = ?graph.startup_order(), "Built service manifests");
        Ok(ordered)
    }

    fn check_required(&self) -> Result<(), ManifestError> {
        let spec = self.spec;

        if spec.state_path.as_os_str().is_empty() {
            return Err(ManifestError::missing("state_path"));
        }
        if spec.env_dir.as_os_str().is_empty() {
            return Err(ManifestError::missing("env_dir"));
        }

        require("mqtt.host", spec.mqtt.host.as_deref())?;
        require("mqtt.username", spec.mqtt.username.as_deref())?;
        require("mqtt.password", spec.mqtt.password.as_deref())?;
        require("database.name", Some(spec.database.name.as_str()))?;
        require("database.user", Some(spec.database.user.as_str()))?;

        for (field, port) in [
            ("port", Some(spec.port)),
            ("grafana_port", Some(spec.grafana_port)),
            ("mqtt.port", Some(spec.mqtt.port)),
            ("database.host_port", spec.database.host_port),
        ] {
            if port == Some(0) {
                return Err(ManifestError::invalid(field, "port must be between 1-65535"));
            }
        }

        let health = &spec.database.health_check;
        if health.retries == 0 {
            return Err(ManifestError::invalid(
                "database.health_check.retries",
                "must be at least 1",
            ));
        }
        if health.interval.is_zero() || health.timeout.is_zero() {
            return Err(ManifestError::invalid(
                "database.health_check",
                "interval and timeout must be non-zero",
            ));
        }

        for name in spec.services.keys() {
            if !SERVICES.iter().any(|(_, service)| service == name) {
                return Err(ManifestError::invalid(
                    format!("services.{}", name),
                    "unknown service",
                ));
            }
        }

        Ok(())
    }

    fn identity(&self, service: &str) -> Result<ServiceIdentity, ManifestError> {
        self.spec.identities.validate()?;
        Ok(self.spec.identities.resolve(service)?)
    }

    fn database(&self) -> Result<ServiceManifest, ManifestError> {
        let identity = self.identity(DATABASE_SERVICE)?;
        let db = &self.spec.database;

        let ports = db
            .host_port
            .map(|host_port| PortBinding {
                host_port,
                container_port: DATABASE_CONTAINER_PORT,
            })
            .into_iter()
            .collect();

        Ok(ServiceManifest {
            service_name: DATABASE_SERVICE.to_string(),
            role: ServiceRole::Database,
            image: ImageReference::parse(&self.spec.images.database)?,
            ports,
            environment_file: self.env_file_path(DATABASE_SERVICE),
            volumes: vec![VolumeBinding {
                host_path: self.state_dir(DATABASE_SERVICE),
                container_path: DATABASE_DATA_DIR.to_string(),
                owner: identity.clone(),
            }],
            depends_on: Vec::new(),
            capabilities: Capabilities::none(),
            health_check: Some(HealthCheck {
                test: vec![
                    "CMD-SHELL".to_string(),
                    format!("pg_isready -U {} -d {}", db.user, db.name),
                ],
                interval: db.health_check.interval,
                timeout: db.health_check.timeout,
                retries: db.health_check.retries,
                start_period: db.health_check.start_period,
            }),
            identity,
        })
    }

    fn application(&self) -> Result<ServiceManifest, ManifestError> {
        Ok(ServiceManifest {
            service_name: APPLICATION_SERVICE.to_string(),
            role: ServiceRole::Application,
            image: ImageReference::parse(&self.spec.images.application)?,
            identity: self.identity(APPLICATION_SERVICE)?,
            ports: vec![PortBinding {
                host_port: self.spec.port,
                container_port: APPLICATION_CONTAINER_PORT,
            }],
            environment_file: self.env_file_path(APPLICATION_SERVICE),
            volumes: Vec::new(),
            depends_on: vec![DependsOn::healthy(DATABASE_SERVICE)],
            capabilities: Capabilities::none(),
            health_check: None,
        })
    }

    fn dashboard(&self) -> Result<ServiceManifest, ManifestError> {
        let identity = self.identity(DASHBOARD_SERVICE)?;

        Ok(ServiceManifest {
            service_name: DASHBOARD_SERVICE.to_string(),
            role: ServiceRole::Dashboard,
            image: ImageReference::parse(&self.spec.images.dashboard)?,
            ports: vec![PortBinding {
                host_port: self.spec.grafana_port,
                container_port: DASHBOARD_CONTAINER_PORT,
            }],
            environment_file: self.env_file_path(DASHBOARD_SERVICE),
            volumes: vec![VolumeBinding {
                host_path: self.state_dir(DASHBOARD_SERVICE),
                container_path: DASHBOARD_DATA_DIR.to_string(),
                owner: identity.clone(),
            }],
            depends_on: vec![DependsOn::started(APPLICATION_SERVICE)],
            capabilities: Capabilities::none(),
            health_check: None,
            identity,
        })
    }
}

fn require(field: &str, value: Option<&str>) -> Result<(), ManifestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ManifestError::missing(field)),
    }
}

fn check_port_collisions(manifests: &[ServiceManifest]) -> Result<(), ManifestError> {
    let mut bound: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for manifest in manifests {
        for port in manifest.host_ports() {
            bound
                .entry(port)
                .or_default()
                .push(manifest.service_name.clone());
        }
    }

    match bound.into_iter().find(|(_, services)| services.len() > 1) {
        Some((port, services)) => Err(ManifestError::PortCollision { port, services }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dependency::{DependencyCondition, DependencyError};
    use crate::domain::stack_config::ServiceOverrides;

    fn spec() -> StackConfigSpec {
        let mut spec = StackConfigSpec::default();
        spec.state_path = PathBuf::from("/var/lib/tm");
        spec.mqtt.host = Some("broker.local".to_string());
        spec.mqtt.username = Some("u".to_string());
        spec.mqtt.password = Some("p".to_string());
        spec
    }

    fn edge_set(manifests: &[ServiceManifest]) -> Vec<(String, String, DependencyCondition)> {
        let mut edges: Vec<_> = manifests
            .iter()
            .flat_map(|m| {
                m.depends_on
                    .iter()
                    .map(|d| (m.service_name.clone(), d.service.clone(), d.condition))
            })
            .collect();
        edges.sort();
        edges
    }

    #[test]
    fn test_builds_three_manifests_in_startup_order() {
        let manifests = ManifestBuilder::new(&spec()).build().unwrap();
        let names: Vec<_> = manifests.iter().map(|m| m.service_name.as_str()).collect();
        assert_eq!(names, ["postgres", "teslamate", "grafana"]);
    }

    #[test]
    fn test_dependency_edges_exact() {
        let manifests = ManifestBuilder::new(&spec()).build().unwrap();
        assert_eq!(
            edge_set(&manifests),
            vec![
                ("grafana".to_string(), "teslamate".to_string(), DependencyCondition::Started),
                ("teslamate".to_string(), "postgres".to_string(), DependencyCondition::Healthy),
            ]
        );
    }

    #[test]
    fn test_database_has_health_check_and_volume() {
        let manifests = ManifestBuilder::new(&spec()).build().unwrap();
        let db = &manifests[0];
        let check = db.health_check.as_ref().unwrap();
        assert_eq!(check.test[1], "pg_isready -U teslamate -d teslamate");
        assert_eq!(check.retries, 5);
        assert_eq!(db.volumes[0].host_path, PathBuf::from("/var/lib/tm/postgres"));
        assert_eq!(db.volumes[0].owner.uid, 951);
        assert!(db.ports.is_empty());
    }

    #[test]
    fn test_application_drops_capabilities_and_binds_port() {
        let manifests = ManifestBuilder::new(&spec()).build().unwrap();
        let app = &manifests[1];
        assert_eq!(app.capabilities.drop, vec!["ALL"]);
        assert!(app.capabilities.add.is_empty());
        assert_eq!(
            app.ports,
            vec![PortBinding {
                host_port: 4000,
                container_port: 4000
            }]
        );
        assert_eq!(
            app.environment_file,
            PathBuf::from("/run/telestack/env/teslamate.env")
        );
    }

    #[test]
    fn test_missing_mqtt_password() {
        let mut spec = spec();
        spec.mqtt.password = None;
        let err = ManifestBuilder::new(&spec).build().unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingConfiguration { ref field } if field == "mqtt.password"
        ));
    }

    #[test]
    fn test_blank_mqtt_host_is_missing() {
        let mut spec = spec();
        spec.mqtt.host = Some("  ".to_string());
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::MissingConfiguration { .. })
        ));
    }

    #[test]
    fn test_port_collision() {
        let mut spec = spec();
        spec.grafana_port = 4000;
        match ManifestBuilder::new(&spec).build().unwrap_err() {
            ManifestError::PortCollision { port, services } => {
                assert_eq!(port, 4000);
                assert_eq!(services, vec!["teslamate", "grafana"]);
            }
            other => panic!("expected port collision, got {other:?}"),
        }
    }

    #[test]
    fn test_database_host_port_collision() {
        let mut spec = spec();
        spec.database.host_port = Some(3000);
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::PortCollision { port: 3000, .. })
        ));
    }

    #[test]
    fn test_zero_port_invalid() {
        let mut spec = spec();
        spec.port = 0;
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_injected_cycle() {
        let mut spec = spec();
        spec.services.insert(
            "postgres".to_string(),
            ServiceOverrides {
                depends_on: vec![DependsOn::started("grafana")],
                ..Default::default()
            },
        );
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::Dependency(DependencyError::Cycle { .. }))
        ));
    }

    #[test]
    fn test_repeated_override_edge_keeps_health_gate() {
        let mut spec = spec();
        spec.services.insert(
            "teslamate".to_string(),
            ServiceOverrides {
                depends_on: vec![DependsOn::started("postgres")],
                ..Default::default()
            },
        );

        let manifests = ManifestBuilder::new(&spec).build().unwrap();
        let names: Vec<_> = manifests.iter().map(|m| m.service_name.as_str()).collect();
        assert_eq!(names, ["postgres", "teslamate", "grafana"]);
        assert_eq!(
            manifests[1].depends_on,
            vec![DependsOn::healthy(DATABASE_SERVICE)]
        );
    }

    #[test]
    fn test_unresolvable_image() {
        let mut spec = spec();
        spec.images.dashboard = "Grafana::latest".to_string();
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_unknown_service_override() {
        let mut spec = spec();
        spec.services.insert("redis".to_string(), ServiceOverrides::default());
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_undeclared_identity() {
        let mut spec = spec();
        spec.identities.accounts.remove("grafana");
        assert!(matches!(
            ManifestBuilder::new(&spec).build(),
            Err(ManifestError::Identity(_))
        ));
    }
}
