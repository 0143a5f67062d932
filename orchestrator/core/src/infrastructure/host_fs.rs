// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host filesystem primitives shared by the local provisioners
//!
//! Atomic replace-in-place writes and owner / mode inspection.

use crate::domain::identity::ServiceIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Whether provisioners change file ownership
///
/// `Skip` is for unprivileged runs: modes are still enforced, owners are
/// left as created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipMode {
    #[default]
    Enforce,
    Skip,
}

impl OwnershipMode {
    /// The `(uid, gid)` to apply, if ownership is enforced
    pub fn owner_for(&self, identity: &ServiceIdentity) -> Option<(u32, u32)> {
        match self {
            Self::Enforce => Some((identity.uid, identity.gid)),
            Self::Skip => None,
        }
    }

    /// True when `meta` is owned as required (always true under `Skip`)
    pub fn owner_matches(&self, meta: &fs::Metadata, identity: &ServiceIdentity) -> bool {
        match self.owner_for(identity) {
            Some((uid, gid)) => meta.uid() == uid && meta.gid() == gid,
            None => true,
        }
    }
}

/// True when the process runs with effective uid 0
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Permission bits of `meta` without the file type
pub fn permission_bits(meta: &fs::Metadata) -> u32 {
    meta.permissions().mode() & 0o7777
}

/// Metadata of `path`, or `None` when it does not exist
pub fn observe(path: &Path) -> io::Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replace `path` atomically with `contents`
///
/// The temp file lives in the target directory and gets its final mode and
/// owner before any content is written, so the content is never readable
/// under looser permissions. The rename is the commit point.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    mode: u32,
    owner: Option<(u32, u32)>,
) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".telestack-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))?;
    if let Some((uid, gid)) = owner {
        std::os::unix::fs::fchown(tmp.as_file(), Some(uid), Some(gid))?;
    }

    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// Create `dir` and missing parents; a newly created leaf gets `mode`
pub fn ensure_dir(dir: &Path, mode: u32) -> io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => return Ok(false),
        Err(e) => return Err(e),
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(mode))?;
    Ok(true)
}
