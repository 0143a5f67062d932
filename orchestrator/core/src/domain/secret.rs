// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Secret Derivation Domain Service
//!
//! Derives stable secret values (database password, encryption key) from a
//! per-host seed. Redeploying the same host with the same seed reproduces the
//! same secrets, so nothing has to be stored besides the seed itself.
//!
//! The seed is an explicit value threaded through every call. There is no
//! process-wide seed.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure `(key, seed) -> secret` derivation

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation prefix mixed into every derivation.
const DERIVATION_CONTEXT: &str = "telestack/v1/secret/";

/// Well-known secret keys used by the stack
pub mod keys {
    /// Password of the database role shared by the application and dashboard
    pub const DB_PASSWORD: &str = "dbPassword";
    /// Application-level encryption key (used to encrypt API tokens at rest)
    pub const ENCRYPTION_KEY: &str = "encryptionKey";
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret seed is unavailable: {0}")]
    MissingSeed(String),

    #[error("Invalid seed source '{0}'. Expected 'file:<path>' or 'env:<VAR>'")]
    InvalidSource(String),

    #[error("Secret key cannot be empty")]
    EmptyKey,

    #[error("Seed file {0} already exists")]
    SeedExists(PathBuf),

    #[error("Failed to write seed file {path}: {source}")]
    SeedFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-host seed all secrets are derived from
///
/// Never empty. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSeed(Vec<u8>);

impl SecretSeed {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SecretError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SecretError::MissingSeed("seed is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretSeed(<redacted, {} bytes>)", self.0.len())
    }
}

/// Where the per-host seed comes from
///
/// Parsed from `file:<path>` or `env:<VAR>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    File(PathBuf),
    Env(String),
}

impl FromStr for SeedSource {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(SecretError::InvalidSource(s.to_string()));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if let Some(var) = s.strip_prefix("env:") {
            if var.is_empty() {
                return Err(SecretError::InvalidSource(s.to_string()));
            }
            return Ok(Self::Env(var.to_string()));
        }
        Err(SecretError::InvalidSource(s.to_string()))
    }
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Env(var) => write!(f, "env:{}", var),
        }
    }
}

/// A secret value derived from `(key, seed)`
///
/// The value is only reachable through [`DerivedSecret::expose`]; `Debug`
/// prints the key alone so secrets cannot leak through log fields.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedSecret {
    key: String,
    value: String,
}

impl DerivedSecret {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for DerivedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedSecret")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Derive the secret for `key` from `seed`
///
/// HMAC-SHA256 keyed with the seed over `telestack/v1/secret/<key>`,
/// hex-encoded. The result is 64 lowercase hex characters.
///
/// # Examples
/// ```
/// use telestack_core::domain::secret::{derive, SecretSeed};
///
/// let seed = SecretSeed::new(b"host-seed".to_vec()).unwrap();
/// let a = derive("dbPassword", &seed).unwrap();
/// let b = derive("dbPassword", &seed).unwrap();
/// assert_eq!(a.expose(), b.expose());
/// assert_eq!(a.expose().len(), 64);
/// ```
pub fn derive(key: &str, seed: &SecretSeed) -> Result<DerivedSecret, SecretError> {
    if key.is_empty() {
        return Err(SecretError::EmptyKey);
    }

    let mut mac = HmacSha256::new_from_slice(seed.as_bytes())
        .map_err(|e| SecretError::MissingSeed(e.to_string()))?;
    mac.update(DERIVATION_CONTEXT.as_bytes());
    mac.update(key.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(DerivedSecret {
        key: key.to_string(),
        value: hex::encode(digest),
    })
}

/// The secrets a stack deployment needs
#[derive(Debug, Clone)]
pub struct StackSecrets {
    pub db_password: DerivedSecret,
    pub encryption_key: DerivedSecret,
}

impl StackSecrets {
    pub fn derive(seed: &SecretSeed) -> Result<Self, SecretError> {
        Ok(Self {
            db_password: derive(keys::DB_PASSWORD, seed)?,
            encryption_key: derive(keys::ENCRYPTION_KEY, seed)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn seed(bytes: &[u8]) -> SecretSeed {
        SecretSeed::new(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_derive_is_deterministic() {
        let s = seed(b"S1");
        let first = derive(keys::DB_PASSWORD, &s).unwrap();
        let second = derive(keys::DB_PASSWORD, &s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_derive_known_vector() {
        let s = seed(b"S1");
        assert_eq!(
            derive(keys::DB_PASSWORD, &s).unwrap().expose(),
            "3bd80802d3ec92e80b35f85cee2eced0ecafdbd3f5feb7e1b7a4d9b94bbf83bf"
        );
        assert_eq!(
            derive(keys::ENCRYPTION_KEY, &s).unwrap().expose(),
            "fc3d1167d7fd65c55e0740a59680533b48fe9c86cea5e058ad2cfdece91cc219"
        );
    }

    #[test]
    fn test_distinct_keys_distinct_values_across_seeds() {
        let mut seen = HashSet::new();
        for i in 0..500u32 {
            let s = seed(format!("host-{i}").as_bytes());
            let db = derive(keys::DB_PASSWORD, &s).unwrap();
            let enc = derive(keys::ENCRYPTION_KEY, &s).unwrap();
            assert_ne!(db.expose(), enc.expose());
            assert!(seen.insert(db.expose().to_string()));
            assert!(seen.insert(enc.expose().to_string()));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = derive(keys::DB_PASSWORD, &seed(b"S1")).unwrap();
        let b = derive(keys::DB_PASSWORD, &seed(b"S2")).unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn test_empty_seed_is_missing() {
        let result = SecretSeed::new(Vec::new());
        assert!(matches!(result, Err(SecretError::MissingSeed(_))));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(derive("", &seed(b"S1")), Err(SecretError::EmptyKey)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let s = seed(b"super-secret-seed");
        let secret = derive(keys::DB_PASSWORD, &s).unwrap();
        let rendered = format!("{:?} {:?}", s, secret);
        assert!(!rendered.contains("super-secret-seed"));
        assert!(!rendered.contains(secret.expose()));
        assert!(rendered.contains("dbPassword"));
    }

    #[test]
    fn test_seed_source_parse() {
        assert_eq!(
            "file:/var/lib/telestack/seed".parse::<SeedSource>().unwrap(),
            SeedSource::File(PathBuf::from("/var/lib/telestack/seed"))
        );
        assert_eq!(
            "env:TELESTACK_SEED".parse::<SeedSource>().unwrap(),
            SeedSource::Env("TELESTACK_SEED".to_string())
        );
        assert!("file:".parse::<SeedSource>().is_err());
        assert!("vault:kv/seed".parse::<SeedSource>().is_err());
    }
}
