// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Container image references
//!
//! `[registry[:port]/]repository[:tag][@sha256:<hex>]`. The first path
//! component is a registry only when it contains `.` or `:`, or is
//! `localhost`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use regex::Regex;
use thiserror::Error;

static COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("component regex is valid")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag regex is valid")
});

static DIGEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sha256:[a-f0-9]{64}$").expect("digest regex is valid")
});

static REGISTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.-]+(?::[0-9]{1,5})?$").expect("registry regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unresolvable image reference '{reference}': {reason}")]
pub struct ImageError {
    pub reference: String,
    pub reason: String,
}

/// Parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        let fail = |reason: &str| ImageError {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(fail("empty reference"));
        }
        if reference.len() > 255 {
            return Err(fail("longer than 255 characters"));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((rest, digest)) => {
                if !DIGEST.is_match(digest) {
                    return Err(fail("invalid digest"));
                }
                (rest, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a registry port.
        let last_slash = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &name_tag[split + 1..];
                if !TAG.is_match(tag) {
                    return Err(fail("invalid tag"));
                }
                (&name_tag[..split], Some(tag.to_string()))
            }
            None => (name_tag, None),
        };

        let mut components: Vec<&str> = name.split('/').collect();
        let registry = if components.len() > 1
            && (components[0].contains('.')
                || components[0].contains(':')
                || components[0] == "localhost")
        {
            let registry = components.remove(0);
            if !REGISTRY.is_match(registry) {
                return Err(fail("invalid registry host"));
            }
            Some(registry.to_string())
        } else {
            None
        };

        if components.iter().any(|c| !COMPONENT.is_match(c)) {
            return Err(fail("invalid repository name"));
        }

        Ok(Self {
            registry,
            repository: components.join("/"),
            tag,
            digest,
        })
    }
}

impl FromStr for ImageReference {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = ImageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let image = ImageReference::parse("postgres:16").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "postgres");
        assert_eq!(image.tag.as_deref(), Some("16"));
    }

    #[test]
    fn test_parse_namespaced_without_registry() {
        let image = ImageReference::parse("teslamate/teslamate:latest").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "teslamate/teslamate");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ImageReference::parse("registry.local:5000/team/grafana:11.0.0").unwrap();
        assert_eq!(image.registry.as_deref(), Some("registry.local:5000"));
        assert_eq!(image.repository, "team/grafana");
        assert_eq!(image.tag.as_deref(), Some("11.0.0"));
        assert_eq!(image.to_string(), "registry.local:5000/team/grafana:11.0.0");
    }

    #[test]
    fn test_parse_digest() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let reference = format!("ghcr.io/teslamate-org/teslamate@{}", digest);
        let image = ImageReference::parse(&reference).unwrap();
        assert_eq!(image.digest.as_deref(), Some(digest.as_str()));
        assert_eq!(image.tag, None);
    }

    #[test]
    fn test_reject_unresolvable() {
        for bad in [
            "",
            "Postgres",
            "postgres:",
            "postgres:bad tag",
            "a//b",
            "img@sha256:xyz",
            "-lead",
        ] {
            assert!(ImageReference::parse(bad).is_err(), "{bad}");
        }
    }
}
