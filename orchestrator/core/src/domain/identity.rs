// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service Identities
//!
//! Every service runs as a dedicated, non-interactive system account. All
//! accounts share one group. Numeric ids are declared in configuration, never
//! allocated, so volume ownership survives redeploys and host rebuilds.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Identity table, provisioning rules, host account port

use crate::domain::change::Change;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("No identity declared for service '{0}'")]
    Undeclared(String),

    #[error("Identity conflict: {0}")]
    Conflict(String),

    #[error("Refusing privileged id {id} for '{name}'")]
    Privileged { name: String, id: u32 },

    #[error("Host account operation failed: {0}")]
    Host(String),
}

/// Account a service runs as
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl ServiceIdentity {
    /// `uid:gid` as understood by container runtimes
    pub fn user_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

/// Shared group all service accounts belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub gid: u32,
}

/// Configured service-to-identity table
///
/// Account names equal service names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTable {
    pub group: GroupSpec,
    pub accounts: BTreeMap<String, u32>,
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self {
            group: GroupSpec {
                name: "teslamate".to_string(),
                gid: 950,
            },
            accounts: BTreeMap::from([
                ("postgres".to_string(), 951),
                ("teslamate".to_string(), 952),
                ("grafana".to_string(), 953),
            ]),
        }
    }
}

impl IdentityTable {
    /// Check the table is usable: no root ids, no shared uids
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.group.name.is_empty() {
            return Err(IdentityError::Conflict("group name cannot be empty".to_string()));
        }
        if self.group.gid == 0 {
            return Err(IdentityError::Privileged {
                name: self.group.name.clone(),
                id: 0,
            });
        }

        let mut owners: HashMap<u32, &str> = HashMap::new();
        for (name, uid) in &self.accounts {
            if *uid == 0 {
                return Err(IdentityError::Privileged {
                    name: name.clone(),
                    id: 0,
                });
            }
            if let Some(other) = owners.insert(*uid, name) {
                return Err(IdentityError::Conflict(format!(
                    "uid {} declared for both '{}' and '{}'",
                    uid, other, name
                )));
            }
        }

        Ok(())
    }

    /// Look up the identity declared for a service
    pub fn resolve(&self, service: &str) -> Result<ServiceIdentity, IdentityError> {
        let uid = self
            .accounts
            .get(service)
            .ok_or_else(|| IdentityError::Undeclared(service.to_string()))?;

        Ok(ServiceIdentity {
            name: service.to_string(),
            uid: *uid,
            gid: self.group.gid,
        })
    }
}

/// Observed state of a host account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountEntry {
    pub uid: u32,
    pub gid: u32,
}

/// Host account database (passwd/group)
///
/// Implementations create system accounts without a login shell or password.
pub trait HostAccounts: Send + Sync {
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, IdentityError>;
    fn lookup_user(&self, name: &str) -> Result<Option<AccountEntry>, IdentityError>;
    fn create_group(&self, group: &GroupSpec) -> Result<(), IdentityError>;
    fn create_user(&self, identity: &ServiceIdentity, group: &GroupSpec)
        -> Result<(), IdentityError>;
}

/// Realizes the identity table on a host
///
/// Idempotent: existing matching accounts are left alone; an existing
/// account with different ids is a conflict and is never reassigned.
pub struct IdentityProvisioner<'a> {
    table: &'a IdentityTable,
    host: &'a dyn HostAccounts,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(table: &'a IdentityTable, host: &'a dyn HostAccounts) -> Self {
        Self { table, host }
    }

    /// Ensure the shared group exists with the declared gid
    pub fn ensure_group(&self) -> Result<Change, IdentityError> {
        let group = &self.table.group;
        match self.host.lookup_group(&group.name)? {
            Some(gid) if gid == group.gid => {
                debug!(group = %group.name, gid, "Group already present");
                Ok(Change::Unchanged)
            }
            Some(gid) => Err(IdentityError::Conflict(format!(
                "group '{}' exists with gid {}, expected {}",
                group.name, gid, group.gid
            ))),
            None => {
                self.host.create_group(group)?;
                info!(group = %group.name, gid = group.gid, "Created service group");
                Ok(Change::Created)
            }
        }
    }

    /// Ensure the account for `service` exists and return its identity
    pub fn provision(&self, service: &str) -> Result<(ServiceIdentity, Change), IdentityError> {
        self.table.validate()?;
        let identity = self.table.resolve(service)?;

        let change = match self.host.lookup_user(&identity.name)? {
            Some(entry) if entry.uid == identity.uid && entry.gid == identity.gid => {
                debug!(account = %identity.name, uid = identity.uid, "Account already present");
                Change::Unchanged
            }
            Some(entry) => {
                return Err(IdentityError::Conflict(format!(
                    "account '{}' exists as {}:{}, expected {}",
                    identity.name,
                    entry.uid,
                    entry.gid,
                    identity.user_spec()
                )))
            }
            None => {
                self.host.create_user(&identity, &self.table.group)?;
                info!(
                    account = %identity.name,
                    uid = identity.uid,
                    gid = identity.gid,
                    "Created service account"
                );
                Change::Created
            }
        };

        Ok((identity, change))
    }
}
