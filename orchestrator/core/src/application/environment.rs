// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Per-service environment composition
//!
//! Joins configuration values with derived secrets into the variable set
//! each service receives through its env file. Secrets only ever travel
//! this way; they never reach the compose document or process arguments.

use crate::application::manifest_builder::{
    APPLICATION_SERVICE, DASHBOARD_SERVICE, DATABASE_SERVICE,
};
use crate::domain::manifest::ManifestError;
use crate::domain::secret::StackSecrets;
use crate::domain::stack_config::StackConfigSpec;
use std::collections::BTreeMap;

pub type Variables = BTreeMap<String, String>;

/// Variables generated for the database service
pub const DATABASE_VARIABLES: [&str; 3] = ["POSTGRES_DB", "POSTGRES_PASSWORD", "POSTGRES_USER"];

/// Variables generated for the application service
pub const APPLICATION_VARIABLES: [&str; 9] = [
    "DATABASE_HOST",
    "DATABASE_NAME",
    "DATABASE_PASS",
    "DATABASE_USER",
    "ENCRYPTION_KEY",
    "MQTT_HOST",
    "MQTT_PASSWORD",
    "MQTT_PORT",
    "MQTT_USERNAME",
];

/// Variables generated for the dashboard service
pub const DASHBOARD_VARIABLES: [&str; 4] = [
    "DATABASE_HOST",
    "DATABASE_NAME",
    "DATABASE_PASS",
    "DATABASE_USER",
];

/// Compose the full variable set of every service, keyed by service name
///
/// # Errors
/// - `ManifestError::MissingConfiguration` when an MQTT parameter is absent
/// - `ManifestError::DuplicateVariable` when `extra_env` shadows a generated variable
pub fn compose(
    spec: &StackConfigSpec,
    secrets: &StackSecrets,
) -> Result<BTreeMap<String, Variables>, ManifestError> {
    let db = &spec.database;
    let db_password = secrets.db_password.expose();

    let database = vars([
        ("POSTGRES_USER", db.user.as_str()),
        ("POSTGRES_PASSWORD", db_password),
        ("POSTGRES_DB", db.name.as_str()),
    ]);

    let db_client = [
        ("DATABASE_USER", db.user.as_str()),
        ("DATABASE_PASS", db_password),
        ("DATABASE_NAME", db.name.as_str()),
        ("DATABASE_HOST", DATABASE_SERVICE),
    ];

    let mqtt = &spec.mqtt;
    let mqtt_port = mqtt.port.to_string();
    let mut application = vars(db_client);
    application.extend(vars([
        ("ENCRYPTION_KEY", secrets.encryption_key.expose()),
        ("MQTT_HOST", required("mqtt.host", mqtt.host.as_deref())?),
        ("MQTT_PORT", mqtt_port.as_str()),
        ("MQTT_USERNAME", required("mqtt.username", mqtt.username.as_deref())?),
        ("MQTT_PASSWORD", required("mqtt.password", mqtt.password.as_deref())?),
    ]));

    let dashboard = vars(db_client);

    let mut environments = BTreeMap::from([
        (DATABASE_SERVICE.to_string(), database),
        (APPLICATION_SERVICE.to_string(), application),
        (DASHBOARD_SERVICE.to_string(), dashboard),
    ]);

    for (service, variables) in environments.iter_mut() {
        let Some(overrides) = spec.overrides(service) else {
            continue;
        };
        for (name, value) in &overrides.extra_env {
            if variables.contains_key(name) {
                return Err(ManifestError::DuplicateVariable {
                    service: service.clone(),
                    name: name.clone(),
                });
            }
            variables.insert(name.clone(), value.clone());
        }
    }

    Ok(environments)
}

fn vars<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Variables {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, ManifestError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ManifestError::missing(field))
}
