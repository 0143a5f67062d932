// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local env file materializer
//!
//! Writes each service's env file with mode 0600 owned by the service
//! identity. Files whose content, owner and mode already match are left
//! untouched.

use crate::domain::change::Change;
use crate::domain::env_file::{EnvFileError, EnvFileMaterializer, EnvironmentFile, ENV_FILE_MODE};
use crate::domain::identity::ServiceIdentity;
use crate::infrastructure::host_fs::{
    ensure_dir, observe, permission_bits, write_atomic, OwnershipMode,
};
use std::path::Path;
use tracing::{debug, info};

/// Mode of a newly created env directory
const ENV_DIR_MODE: u32 = 0o711;

#[derive(Debug, Clone, Default)]
pub struct LocalEnvFileWriter {
    ownership: OwnershipMode,
}

impl LocalEnvFileWriter {
    pub fn new(ownership: OwnershipMode) -> Self {
        Self { ownership }
    }
}

impl EnvFileMaterializer for LocalEnvFileWriter {
    fn materialize(
        &self,
        file: &EnvironmentFile,
        owner: &ServiceIdentity,
    ) -> Result<Change, EnvFileError> {
        let path = file.path();
        let io_err = |source| EnvFileError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent, ENV_DIR_MODE).map_err(io_err)?;
        }

        let rendered = file.render();
        let existing = observe(path).map_err(io_err)?;

        if let Some(meta) = &existing {
            if up_to_date(path, &rendered, meta, owner, self.ownership)? {
                debug!(
                    service = %file.service_name(),
                    path = %path.display(),
                    "Env file unchanged"
                );
                return Ok(Change::Unchanged);
            }
        }

        write_atomic(
            path,
            rendered.as_bytes(),
            ENV_FILE_MODE,
            self.ownership.owner_for(owner),
        )
        .map_err(io_err)?;

        let change = if existing.is_some() {
            Change::Updated
        } else {
            Change::Created
        };
        // Names only; values stay on disk
        info!(
            service = %file.service_name(),
            path = %path.display(),
            variables = ?file.variable_names().collect::<Vec<_>>(),
            change = %change,
            "Materialized env file"
        );
        Ok(change)
    }
}

fn up_to_date(
    path: &Path,
    rendered: &str,
    meta: &std::fs::Metadata,
    owner: &ServiceIdentity,
    ownership: OwnershipMode,
) -> Result<bool, EnvFileError> {
    if !meta.is_file()
        || permission_bits(meta) != ENV_FILE_MODE
        || !ownership.owner_matches(meta, owner)
    {
        return Ok(false);
    }
    let current = std::fs::read(path).map_err(|source| EnvFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(current == rendered.as_bytes())
}
