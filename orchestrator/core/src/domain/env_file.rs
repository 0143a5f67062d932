// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment File
//!
//! One `NAME="VALUE"` file per service. Containers read their credentials
//! from these files so secrets never appear in process arguments or in the
//! orchestration manifest.
//!
//! Values are wrapped in double quotes without escaping. Instead of writing
//! a malformed file, values containing `"`, CR, LF or NUL are rejected.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Validated env file content, rendering and parsing

use crate::domain::change::Change;
use crate::domain::identity::ServiceIdentity;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mode of every materialized env file (owner read/write only)
pub const ENV_FILE_MODE: u32 = 0o600;

/// Characters that break the quoting or that Compose's env_file parser
/// rewrites inside double quotes (`$` interpolation, `\` escapes)
const RESERVED_CHARACTERS: [char; 6] = ['"', '\n', '\r', '\0', '$', '\\'];

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("Invalid environment variable name: '{0}'")]
    InvalidName(String),

    #[error("Value of {name} contains reserved character {character:?}")]
    ReservedCharacter { name: String, character: char },

    #[error("Duplicate environment variable: {0}")]
    Duplicate(String),

    #[error("Malformed env file at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Failed to write env file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rendered environment for one service
///
/// Names are unique and sorted. `Debug` prints variable names only.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentFile {
    service_name: String,
    path: PathBuf,
    variables: BTreeMap<String, String>,
}

impl EnvironmentFile {
    /// Build a validated env file description
    ///
    /// # Errors
    /// - `EnvFileError::InvalidName` if a name is not `[A-Za-z_][A-Za-z0-9_]*`
    /// - `EnvFileError::ReservedCharacter` if a value would break the quoting
    pub fn new(
        service_name: impl Into<String>,
        path: impl Into<PathBuf>,
        variables: BTreeMap<String, String>,
    ) -> Result<Self, EnvFileError> {
        for (name, value) in &variables {
            validate_name(name)?;
            if let Some(character) = value.chars().find(|c| RESERVED_CHARACTERS.contains(c)) {
                return Err(EnvFileError::ReservedCharacter {
                    name: name.clone(),
                    character,
                });
            }
        }

        Ok(Self {
            service_name: service_name.into(),
            path: path.into(),
            variables,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Render as `NAME="VALUE"` lines in name order
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.variables {
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(value);
            out.push_str("\"\n");
        }
        out
    }

    /// Parse env file content back into a mapping
    ///
    /// Blank lines and `#` comments are skipped. Values may be quoted or bare.
    pub fn parse(content: &str) -> Result<BTreeMap<String, String>, EnvFileError> {
        let mut variables = BTreeMap::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, value) = line.split_once('=').ok_or_else(|| EnvFileError::Malformed {
                line: index + 1,
                reason: "missing '='".to_string(),
            })?;
            validate_name(name)?;

            let value = match value.strip_prefix('"') {
                Some(rest) => rest.strip_suffix('"').ok_or_else(|| EnvFileError::Malformed {
                    line: index + 1,
                    reason: "unterminated quote".to_string(),
                })?,
                None => value,
            };

            if variables.insert(name.to_string(), value.to_string()).is_some() {
                return Err(EnvFileError::Duplicate(name.to_string()));
            }
        }

        Ok(variables)
    }
}

impl fmt::Debug for EnvironmentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentFile")
            .field("service_name", &self.service_name)
            .field("path", &self.path)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), EnvFileError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(EnvFileError::InvalidName(name.to_string()))
    }
}

/// Writes env files to the host
///
/// Implementations must replace the target atomically, so a starting
/// container never observes a partially written file.
pub trait EnvFileMaterializer: Send + Sync {
    fn materialize(
        &self,
        file: &EnvironmentFile,
        owner: &ServiceIdentity,
    ) -> Result<Change, EnvFileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_sorted_and_quoted() {
        let file = EnvironmentFile::new(
            "teslamate",
            "/run/telestack/env/teslamate.env",
            vars(&[("MQTT_PORT", "1883"), ("DATABASE_HOST", "postgres")]),
        )
        .unwrap();

        assert_eq!(file.render(), "DATABASE_HOST=\"postgres\"\nMQTT_PORT=\"1883\"\n");
    }

    #[test]
    fn test_round_trip() {
        let original = vars(&[("A", "1"), ("B", "two")]);
        let file = EnvironmentFile::new("svc", "/tmp/svc.env", original.clone()).unwrap();
        let parsed = EnvironmentFile::parse(&file.render()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_round_trip_keeps_equals_and_spaces() {
        let original = vars(&[("URL", "postgres://u@h/db?a=b"), ("TZ", "Europe/Berlin x")]);
        let file = EnvironmentFile::new("svc", "/tmp/svc.env", original.clone()).unwrap();
        assert_eq!(EnvironmentFile::parse(&file.render()).unwrap(), original);
    }

    #[test]
    fn test_reject_quote_in_value() {
        let result = EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[("PASS", "a\"b")]));
        assert!(matches!(
            result,
            Err(EnvFileError::ReservedCharacter { character: '"', .. })
        ));
    }

    #[test]
    fn test_reject_newline_in_value() {
        let result = EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[("PASS", "a\nB=c")]));
        assert!(matches!(result, Err(EnvFileError::ReservedCharacter { .. })));
    }

    #[test]
    fn test_reject_interpolation_and_escape_characters() {
        let dollar = EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[("PASS", "pa$word")]));
        assert!(matches!(
            dollar,
            Err(EnvFileError::ReservedCharacter { character: '$', .. })
        ));

        let backslash = EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[("PASS", r"a\nb")]));
        assert!(matches!(
            backslash,
            Err(EnvFileError::ReservedCharacter { character: '\\', .. })
        ));
    }

    #[test]
    fn test_reject_invalid_names() {
        for name in ["", "1ABC", "WITH-DASH", "WITH SPACE"] {
            let result = EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[(name, "x")]));
            assert!(matches!(result, Err(EnvFileError::InvalidName(_))), "{name}");
        }
    }

    #[test]
    fn test_parse_skips_comments_and_rejects_garbage() {
        let parsed = EnvironmentFile::parse("# generated\n\nA=\"1\"\nB=bare\n").unwrap();
        assert_eq!(parsed, vars(&[("A", "1"), ("B", "bare")]));

        assert!(matches!(
            EnvironmentFile::parse("NOEQUALS\n"),
            Err(EnvFileError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            EnvironmentFile::parse("A=\"open\n"),
            Err(EnvFileError::Malformed { .. })
        ));
        assert!(matches!(
            EnvironmentFile::parse("A=1\nA=2\n"),
            Err(EnvFileError::Duplicate(_))
        ));
    }

    #[test]
    fn test_debug_hides_values() {
        let file =
            EnvironmentFile::new("svc", "/tmp/svc.env", vars(&[("PASS", "hunter2")])).unwrap();
        let rendered = format!("{:?}", file);
        assert!(rendered.contains("PASS"));
        assert!(!rendered.contains("hunter2"));
    }
}
