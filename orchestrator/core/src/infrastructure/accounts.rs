// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host account adapters
//!
//! [`SystemAccounts`] drives the host's passwd/group databases through
//! `getent`, `groupadd` and `useradd`. [`InMemoryAccounts`] backs tests and
//! dry runs.

use crate::domain::identity::{
    AccountEntry, GroupSpec, HostAccounts, IdentityError, ServiceIdentity,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

const NOLOGIN_CANDIDATES: [&str; 3] = ["/usr/sbin/nologin", "/sbin/nologin", "/bin/false"];

/// System accounts without login shell, home directory or usable password
pub struct SystemAccounts {
    shell: PathBuf,
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAccounts {
    pub fn new() -> Self {
        let shell = NOLOGIN_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .unwrap_or(Path::new(NOLOGIN_CANDIDATES[0]))
            .to_path_buf();
        Self { shell }
    }

    /// `getent <database> <key>`; exit status 2 means "not found"
    fn getent(&self, database: &str, key: &str) -> Result<Option<String>, IdentityError> {
        let output = Command::new("getent")
            .arg(database)
            .arg(key)
            .output()
            .map_err(|e| IdentityError::Host(format!("failed to run getent: {}", e)))?;

        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            Some(2) => Ok(None),
            _ => Err(IdentityError::Host(format!(
                "getent {} {} failed: {}",
                database,
                key,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn run(&self, command: &mut Command, what: &str) -> Result<(), IdentityError> {
        let output = command
            .output()
            .map_err(|e| IdentityError::Host(format!("failed to {}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IdentityError::Host(format!("failed to {}: {}", what, stderr.trim())));
        }
        Ok(())
    }
}

impl HostAccounts for SystemAccounts {
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, IdentityError> {
        self.getent("group", name)?
            .map(|line| parse_group_line(&line))
            .transpose()
    }

    fn lookup_user(&self, name: &str) -> Result<Option<AccountEntry>, IdentityError> {
        self.getent("passwd", name)?
            .map(|line| parse_passwd_line(&line))
            .transpose()
    }

    fn create_group(&self, group: &GroupSpec) -> Result<(), IdentityError> {
        self.run(
            Command::new("groupadd")
                .arg("--system")
                .arg("--gid")
                .arg(group.gid.to_string())
                .arg(&group.name),
            &format!("create group {}", group.name),
        )
    }

    fn create_user(
        &self,
        identity: &ServiceIdentity,
        group: &GroupSpec,
    ) -> Result<(), IdentityError> {
        self.run(
            Command::new("useradd")
                .arg("--system")
                .arg("--uid")
                .arg(identity.uid.to_string())
                .arg("--gid")
                .arg(group.gid.to_string())
                .arg("--no-create-home")
                .arg("--home-dir")
                .arg("/nonexistent")
                .arg("--shell")
                .arg(&self.shell)
                .arg("--password")
                .arg("!")
                .arg("--comment")
                .arg(format!("telestack {} service", identity.name))
                .arg(&identity.name),
            &format!("create account {}", identity.name),
        )
    }
}

fn parse_id(field: Option<&str>, line: &str) -> Result<u32, IdentityError> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| IdentityError::Host(format!("unparseable account entry: {}", line)))
}

/// `name:x:gid:members`
fn parse_group_line(line: &str) -> Result<u32, IdentityError> {
    parse_id(line.split(':').nth(2), line)
}

/// `name:x:uid:gid:gecos:home:shell`
fn parse_passwd_line(line: &str) -> Result<AccountEntry, IdentityError> {
    let mut fields = line.split(':').skip(2);
    let uid = parse_id(fields.next(), line)?;
    let gid = parse_id(fields.next(), line)?;
    Ok(AccountEntry { uid, gid })
}

/// Account database held in memory
#[derive(Default)]
pub struct InMemoryAccounts {
    groups: Mutex<HashMap<String, u32>>,
    users: Mutex<HashMap<String, AccountEntry>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an account, e.g. to simulate an existing conflict
    pub fn with_user(self, name: &str, uid: u32, gid: u32) -> Self {
        self.users.lock().insert(name.to_string(), AccountEntry { uid, gid });
        self
    }

    pub fn with_group(self, name: &str, gid: u32) -> Self {
        self.groups.lock().insert(name.to_string(), gid);
        self
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }
}

impl HostAccounts for InMemoryAccounts {
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, IdentityError> {
        Ok(self.groups.lock().get(name).copied())
    }

    fn lookup_user(&self, name: &str) -> Result<Option<AccountEntry>, IdentityError> {
        Ok(self.users.lock().get(name).copied())
    }

    fn create_group(&self, group: &GroupSpec) -> Result<(), IdentityError> {
        let mut groups = self.groups.lock();
        if groups.values().any(|gid| *gid == group.gid) {
            return Err(IdentityError::Conflict(format!("gid {} already in use", group.gid)));
        }
        groups.insert(group.name.clone(), group.gid);
        Ok(())
    }

    fn create_user(
        &self,
        identity: &ServiceIdentity,
        group: &GroupSpec,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.lock();
        if users.values().any(|entry| entry.uid == identity.uid) {
            return Err(IdentityError::Conflict(format!("uid {} already in use", identity.uid)));
        }
        users.insert(
            identity.name.clone(),
            AccountEntry {
                uid: identity.uid,
                gid: group.gid,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change::Change;
    use crate::domain::identity::{IdentityProvisioner, IdentityTable};

    #[test]
    fn test_parse_group_line() {
        assert_eq!(parse_group_line("teslamate:x:950:").unwrap(), 950);
        assert!(parse_group_line("broken").is_err());
    }

    #[test]
    fn test_parse_passwd_line() {
        let entry = parse_passwd_line(
            "grafana:x:953:950:telestack grafana service:/nonexistent:/usr/sbin/nologin",
        )
        .unwrap();
        assert_eq!(entry, AccountEntry { uid: 953, gid: 950 });
        assert!(parse_passwd_line("grafana:x:abc:950::/:/bin/false").is_err());
    }

    #[test]
    fn test_provisioning_is_idempotent() {
        let table = IdentityTable::default();
        let host = InMemoryAccounts::new();
        let provisioner = IdentityProvisioner::new(&table, &host);

        assert_eq!(provisioner.ensure_group().unwrap(), Change::Created);
        for service in ["postgres", "teslamate", "grafana"] {
            assert_eq!(provisioner.provision(service).unwrap().1, Change::Created);
        }
        assert_eq!(provisioner.ensure_group().unwrap(), Change::Unchanged);
        for service in ["postgres", "teslamate", "grafana"] {
            assert_eq!(provisioner.provision(service).unwrap().1, Change::Unchanged);
        }
        assert_eq!(host.user_count(), 3);
    }

    #[test]
    fn test_existing_account_with_other_uid_is_conflict() {
        let table = IdentityTable::default();
        let host = InMemoryAccounts::new()
            .with_group("teslamate", 950)
            .with_user("postgres", 999, 950);
        let provisioner = IdentityProvisioner::new(&table, &host);

        assert!(matches!(
            provisioner.provision("postgres"),
            Err(IdentityError::Conflict(_))
        ));
        assert_eq!(host.lookup_user("postgres").unwrap().unwrap().uid, 999);
    }

    #[test]
    fn test_group_gid_mismatch_is_conflict() {
        let table = IdentityTable::default();
        let host = InMemoryAccounts::new().with_group("teslamate", 1000);
        assert!(matches!(
            IdentityProvisioner::new(&table, &host).ensure_group(),
            Err(IdentityError::Conflict(_))
        ));
    }
}
