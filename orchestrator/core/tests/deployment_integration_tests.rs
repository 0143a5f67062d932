// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telestack_core::application::deployment::{ArtifactKind, DeployError, DeploymentPlan, Deployer};
use telestack_core::domain::change::Change;
use telestack_core::domain::dependency::{DependencyCondition, DependencyError, DependsOn};
use telestack_core::domain::env_file::EnvironmentFile;
use telestack_core::domain::manifest::ManifestError;
use telestack_core::domain::secret::SecretSeed;
use telestack_core::domain::stack_config::{ServiceOverrides, StackConfigSpec};
use telestack_core::infrastructure::compose::{ComposeDocument, ComposeFileWriter};
use telestack_core::infrastructure::{
    InMemoryAccounts, LocalEnvFileWriter, LocalStatePaths, OwnershipMode,
};

const DB_PASSWORD_S1: &str = "3bd80802d3ec92e80b35f85cee2eced0ecafdbd3f5feb7e1b7a4d9b94bbf83bf";
const ENCRYPTION_KEY_S1: &str = "fc3d1167d7fd65c55e0740a59680533b48fe9c86cea5e058ad2cfdece91cc219";

fn seed() -> SecretSeed {
    SecretSeed::new(b"S1".to_vec()).unwrap()
}

fn spec_at(root: &Path) -> StackConfigSpec {
    let mut spec = StackConfigSpec::default();
    spec.project = "teslamate".to_string();
    spec.state_path = root.join("state");
    spec.env_dir = root.join("env");
    spec.compose_file = root.join("compose.yaml");
    spec.port = 4000;
    spec.grafana_port = 3000;
    spec.mqtt.host = Some("broker.local".to_string());
    spec.mqtt.port = 1883;
    spec.mqtt.username = Some("u".to_string());
    spec.mqtt.password = Some("p".to_string());
    spec
}

fn deployer() -> Deployer {
    Deployer::new(
        Arc::new(InMemoryAccounts::new()),
        Arc::new(LocalStatePaths::new(OwnershipMode::Skip)),
        Arc::new(LocalEnvFileWriter::new(OwnershipMode::Skip)),
        Arc::new(ComposeFileWriter),
    )
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

fn read_env(path: &Path) -> std::collections::BTreeMap<String, String> {
    EnvironmentFile::parse(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_end_to_end_scenario() {
    let mut spec = StackConfigSpec::default();
    spec.state_path = PathBuf::from("/var/lib/tm");
    spec.mqtt.host = Some("broker.local".to_string());
    spec.mqtt.username = Some("u".to_string());
    spec.mqtt.password = Some("p".to_string());

    let plan = DeploymentPlan::build(&spec, &seed()).unwrap();

    let app_env = plan.env_file("teslamate").unwrap().variables();
    assert_eq!(app_env["DATABASE_PASS"], DB_PASSWORD_S1);
    assert_eq!(app_env["ENCRYPTION_KEY"], ENCRYPTION_KEY_S1);
    assert_eq!(app_env["MQTT_HOST"], "broker.local");
    assert_eq!(app_env["MQTT_PORT"], "1883");

    let db_env = plan.env_file("postgres").unwrap().variables();
    assert_eq!(db_env["POSTGRES_PASSWORD"], DB_PASSWORD_S1);

    let grafana_env = plan.env_file("grafana").unwrap().variables();
    assert_eq!(grafana_env["DATABASE_PASS"], DB_PASSWORD_S1);

    let paths: Vec<_> = plan.state_paths.iter().map(|s| s.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/var/lib/tm/postgres"),
            PathBuf::from("/var/lib/tm/grafana")
        ]
    );

    let app = plan
        .manifests
        .iter()
        .find(|m| m.service_name == "teslamate")
        .unwrap();
    assert_eq!(app.ports[0].host_port, 4000);
    let grafana = plan
        .manifests
        .iter()
        .find(|m| m.service_name == "grafana")
        .unwrap();
    assert_eq!(grafana.ports[0].host_port, 3000);

    let mut edges = plan.dependency_edges();
    edges.sort();
    assert_eq!(
        edges,
        vec![
            ("grafana".to_string(), DependsOn::started("teslamate")),
            ("teslamate".to_string(), DependsOn::healthy("postgres")),
        ]
    );
}

#[test]
fn test_apply_materializes_host_state() {
    let root = tempfile::tempdir().unwrap();
    let spec = spec_at(root.path());
    let plan = DeploymentPlan::build(&spec, &seed()).unwrap();

    let report = deployer().apply(&plan).unwrap();
    assert_eq!(report.count(Change::Created), report.artifacts.len());

    for service in ["postgres", "grafana"] {
        let dir = spec.state_path.join(service);
        assert!(dir.is_dir());
        assert_eq!(mode(&dir), 0o700);
    }
    assert!(!spec.state_path.join("teslamate").exists());

    for service in ["postgres", "teslamate", "grafana"] {
        let path = spec.env_dir.join(format!("{service}.env"));
        assert_eq!(mode(&path), 0o600);
        assert_eq!(read_env(&path), *plan.env_file(service).unwrap().variables());
    }

    let compose = fs::read_to_string(&spec.compose_file).unwrap();
    let document: ComposeDocument = serde_yaml::from_str(&compose).unwrap();
    assert_eq!(document.name, "teslamate");
    assert_eq!(
        document.services["teslamate"].depends_on["postgres"].condition,
        "service_healthy"
    );
    assert!(!compose.contains(DB_PASSWORD_S1));
    assert!(!compose.contains(ENCRYPTION_KEY_S1));
}

#[test]
fn test_second_apply_is_noop_and_keeps_data() {
    let root = tempfile::tempdir().unwrap();
    let spec = spec_at(root.path());
    let plan = DeploymentPlan::build(&spec, &seed()).unwrap();
    let deployer = deployer();

    deployer.apply(&plan).unwrap();
    let data = spec.state_path.join("postgres/PG_VERSION");
    fs::write(&data, "16\n").unwrap();

    let second = deployer.apply(&plan).unwrap();
    assert!(second.is_noop(), "{:?}", second.changed().collect::<Vec<_>>());
    assert_eq!(fs::read_to_string(&data).unwrap(), "16\n");
}

#[test]
fn test_drift_is_repaired() {
    let root = tempfile::tempdir().unwrap();
    let spec = spec_at(root.path());
    let plan = DeploymentPlan::build(&spec, &seed()).unwrap();
    let deployer = deployer();
    deployer.apply(&plan).unwrap();

    let grafana_dir = spec.state_path.join("grafana");
    fs::set_permissions(&grafana_dir, fs::Permissions::from_mode(0o755)).unwrap();
    let env = spec.env_dir.join("postgres.env");
    fs::write(&env, "POSTGRES_PASSWORD=\"tampered\"\n").unwrap();

    let report = deployer.apply(&plan).unwrap();
    let changed: Vec<_> = report.changed().map(|a| (a.kind, a.change)).collect();
    assert_eq!(
        changed,
        vec![
            (ArtifactKind::StateDirectory, Change::Updated),
            (ArtifactKind::EnvFile, Change::Updated),
        ]
    );
    assert_eq!(mode(&grafana_dir), 0o700);
    assert_eq!(read_env(&env)["POSTGRES_PASSWORD"], DB_PASSWORD_S1);
    assert_eq!(mode(&env), 0o600);
}

#[test]
fn test_new_seed_rotates_every_secret() {
    let root = tempfile::tempdir().unwrap();
    let spec = spec_at(root.path());
    let first = DeploymentPlan::build(&spec, &seed()).unwrap();
    let second = DeploymentPlan::build(&spec, &SecretSeed::new(b"S2".to_vec()).unwrap()).unwrap();

    for service in ["postgres", "teslamate", "grafana"] {
        assert_ne!(
            first.env_file(service).unwrap().variables(),
            second.env_file(service).unwrap().variables()
        );
    }
    assert_eq!(first.manifests, second.manifests);
}

#[test]
fn test_missing_configuration_writes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let mut spec = spec_at(root.path());
    spec.mqtt.password = None;

    let err = DeploymentPlan::build(&spec, &seed()).unwrap_err();
    assert!(matches!(
        err,
        DeployError::Manifest(ManifestError::MissingConfiguration { ref field })
            if field == "mqtt.password"
    ));
    assert!(!spec.env_dir.exists());
    assert!(!spec.state_path.exists());
}

#[test]
fn test_port_collision_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut spec = spec_at(root.path());
    spec.grafana_port = spec.port;

    assert!(matches!(
        DeploymentPlan::build(&spec, &seed()),
        Err(DeployError::Manifest(ManifestError::PortCollision { port: 4000, .. }))
    ));
}

#[test]
fn test_cycle_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut spec = spec_at(root.path());
    spec.services.insert(
        "postgres".to_string(),
        ServiceOverrides {
            depends_on: vec![DependsOn {
                service: "teslamate".to_string(),
                condition: DependencyCondition::Started,
            }],
            ..Default::default()
        },
    );

    match DeploymentPlan::build(&spec, &seed()).unwrap_err() {
        DeployError::Manifest(ManifestError::Dependency(DependencyError::Cycle { cycle })) => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"postgres".to_string()));
            assert!(cycle.contains(&"teslamate".to_string()));
        }
        other => panic!("expected dependency cycle, got {other:?}"),
    }
}
