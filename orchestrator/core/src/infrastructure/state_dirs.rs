// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local state path provisioner
//!
//! Creates persistent directories and corrects owner / mode drift. Existing
//! content is never touched; ownership is only changed when it differs.

use crate::domain::change::Change;
use crate::domain::identity::ServiceIdentity;
use crate::domain::state_path::{validate_state_path, ProvisionError, StatePathProvisioner};
use crate::infrastructure::host_fs::{observe, permission_bits, OwnershipMode};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct LocalStatePaths {
    ownership: OwnershipMode,
}

impl LocalStatePaths {
    pub fn new(ownership: OwnershipMode) -> Self {
        Self { ownership }
    }
}

fn fs_error<'a>(
    path: &'a Path,
    operation: &'static str,
) -> impl FnOnce(std::io::Error) -> ProvisionError + 'a {
    move |source| ProvisionError::Filesystem {
        path: path.to_path_buf(),
        operation,
        source,
    }
}

impl StatePathProvisioner for LocalStatePaths {
    fn ensure(
        &self,
        path: &Path,
        owner: &ServiceIdentity,
        mode: u32,
    ) -> Result<Change, ProvisionError> {
        validate_state_path(path)?;

        let created = match observe(path).map_err(fs_error(path, "inspect"))? {
            Some(meta) if meta.is_dir() => false,
            Some(_) => return Err(ProvisionError::NotADirectory(path.to_path_buf())),
            None => {
                fs::create_dir_all(path).map_err(fs_error(path, "create"))?;
                true
            }
        };

        let meta = fs::metadata(path).map_err(fs_error(path, "inspect"))?;
        let mut repaired = false;

        if !self.ownership.owner_matches(&meta, owner) {
            std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
                .map_err(fs_error(path, "chown"))?;
            repaired = true;
        }

        if permission_bits(&meta) != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(fs_error(path, "chmod"))?;
            repaired = true;
        }

        let change = if created {
            Change::Created
        } else if repaired {
            Change::Updated
        } else {
            Change::Unchanged
        };

        if change.is_change() {
            info!(
                path = %path.display(),
                owner = %owner.user_spec(),
                mode = %format!("{:o}", mode),
                change = %change,
                "Provisioned state directory"
            );
        } else {
            debug!(path = %path.display(), "State directory unchanged");
        }
        Ok(change)
    }
}
