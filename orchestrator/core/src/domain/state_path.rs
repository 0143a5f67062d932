// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! State Paths
//!
//! Directories backing persistent volumes. They must exist, owned by the
//! service identity with a restrictive mode, before the container using
//! them is allowed to start.

use crate::domain::change::Change;
use crate::domain::identity::ServiceIdentity;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Owner read/write/execute only
pub const DEFAULT_STATE_MODE: u32 = 0o700;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid state path {0}: must be absolute without '..' components")]
    InvalidPath(PathBuf),

    #[error("Failed to {operation} {path}: {source}")]
    Filesystem {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),
}

/// Desired state of one persistent directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePath {
    pub path: PathBuf,
    pub owner: ServiceIdentity,
    pub mode: u32,
}

impl StatePath {
    pub fn new(path: impl Into<PathBuf>, owner: ServiceIdentity) -> Self {
        Self {
            path: path.into(),
            owner,
            mode: DEFAULT_STATE_MODE,
        }
    }
}

/// Reject relative paths and parent-directory traversal
pub fn validate_state_path(path: &Path) -> Result<(), ProvisionError> {
    if !path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
        return Err(ProvisionError::InvalidPath(path.to_path_buf()));
    }
    Ok(())
}

/// Creates and corrects state directories on the host
///
/// `ensure` is idempotent. A second call only fixes owner or mode drift and
/// never removes existing content.
pub trait StatePathProvisioner: Send + Sync {
    fn ensure(&self, path: &Path, owner: &ServiceIdentity, mode: u32)
        -> Result<Change, ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_state_path() {
        assert!(validate_state_path(Path::new("/var/lib/tm/postgres")).is_ok());
        assert!(validate_state_path(Path::new("var/lib/tm")).is_err());
        assert!(validate_state_path(Path::new("/var/lib/../etc")).is_err());
    }

    #[test]
    fn test_default_mode() {
        let owner = ServiceIdentity {
            name: "postgres".to_string(),
            uid: 951,
            gid: 950,
        };
        let state = StatePath::new("/var/lib/tm/postgres", owner);
        assert_eq!(state.mode, 0o700);
    }
}
