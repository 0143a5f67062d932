// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Seed loading and generation
//!
//! The seed is read from a root-only file or an environment variable.
//! Surrounding whitespace is ignored so a trailing newline in the file
//! does not change every derived secret.

use crate::domain::secret::{SecretError, SecretSeed, SeedSource};
use crate::infrastructure::host_fs::{ensure_dir, write_atomic};
use rand::RngCore;
use std::io;
use std::path::Path;
use tracing::info;

/// Mode of a generated seed file
pub const SEED_FILE_MODE: u32 = 0o600;

const SEED_BYTES: usize = 32;

/// Load the seed from its configured source
///
/// # Errors
/// `SecretError::MissingSeed` when the source is absent, unreadable or empty
pub fn load_seed(source: &SeedSource) -> Result<SecretSeed, SecretError> {
    match source {
        SeedSource::File(path) => {
            let bytes = std::fs::read(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    SecretError::MissingSeed(format!("seed file {} does not exist", path.display()))
                }
                _ => SecretError::MissingSeed(format!(
                    "cannot read seed file {}: {}",
                    path.display(),
                    e
                )),
            })?;
            let trimmed = bytes.trim_ascii();
            if trimmed.is_empty() {
                return Err(SecretError::MissingSeed(format!(
                    "seed file {} is empty",
                    path.display()
                )));
            }
            SecretSeed::new(trimmed.to_vec())
        }
        SeedSource::Env(var) => match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => {
                SecretSeed::new(value.trim().as_bytes().to_vec())
            }
            Ok(_) => Err(SecretError::MissingSeed(format!(
                "environment variable {} is empty",
                var
            ))),
            Err(_) => Err(SecretError::MissingSeed(format!(
                "environment variable {} is not set",
                var
            ))),
        },
    }
}

/// Write a fresh random seed (hex encoded) to `path` with mode 0600
///
/// Refuses to replace an existing file unless `force` is set, since a new
/// seed changes every derived secret.
pub fn generate_seed_file(path: &Path, force: bool) -> Result<(), SecretError> {
    if path.exists() && !force {
        return Err(SecretError::SeedExists(path.to_path_buf()));
    }

    let io_err = |source| SecretError::SeedFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent, 0o700).map_err(io_err)?;
    }

    let mut bytes = [0u8; SEED_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let mut encoded = hex::encode(bytes);
    encoded.push('\n');

    write_atomic(path, encoded.as_bytes(), SEED_FILE_MODE, None).map_err(io_err)?;
    info!(path = %path.display(), "Generated secret seed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secret::derive;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_load_from_file_trims_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");
        std::fs::write(&path, "S1\n").unwrap();

        let seed = load_seed(&SeedSource::File(path)).unwrap();
        assert_eq!(seed.as_bytes(), b"S1");
    }

    #[test]
    fn test_missing_file_is_missing_seed() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_seed(&SeedSource::File(dir.path().join("absent"))).unwrap_err();
        assert!(matches!(err, SecretError::MissingSeed(_)));
    }

    #[test]
    fn test_empty_file_is_missing_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");
        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            load_seed(&SeedSource::File(path)),
            Err(SecretError::MissingSeed(_))
        ));
    }

    #[test]
    fn test_load_from_env() {
        std::env::set_var("TELESTACK_TEST_SEED_LOAD", "S1");
        let seed = load_seed(&SeedSource::Env("TELESTACK_TEST_SEED_LOAD".to_string())).unwrap();
        assert_eq!(seed.as_bytes(), b"S1");
    }

    #[test]
    fn test_unset_env_is_missing_seed() {
        let err = load_seed(&SeedSource::Env("TELESTACK_TEST_SEED_UNSET".to_string())).unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/seed");
        generate_seed_file(&path, false).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let seed = load_seed(&SeedSource::File(path.clone())).unwrap();
        assert_eq!(seed.as_bytes().len(), SEED_BYTES * 2);
        assert!(derive("dbPassword", &seed).is_ok());
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed");
        generate_seed_file(&path, false).unwrap();
        let first = std::fs::read(&path).unwrap();

        assert!(matches!(
            generate_seed_file(&path, false),
            Err(SecretError::SeedExists(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), first);

        generate_seed_file(&path, true).unwrap();
        assert_ne!(std::fs::read(&path).unwrap(), first);
    }
}
