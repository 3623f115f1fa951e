//! Ordering of module versions.
//!
//! Versions follow `release[-prerelease][+build]`, where both `release` and `prerelease` are
//! dot-separated identifiers. This is a generic ordering, not strict semantic versioning: any
//! number of release identifiers is accepted and identifiers need not be numeric.

use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::error::{RegistryError, Result};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9.]+)(?:-([a-zA-Z0-9.-]+))?(?:\+[a-zA-Z0-9.-]+)?$")
        .expect("version pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    /// Digits with leading zeros removed, compared by length then lexically so arbitrarily
    /// long numbers never overflow.
    Numeric(String),
    Text(String),
}

impl Identifier {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = raw.trim_start_matches('0');
            let digits = if trimmed.is_empty() { "0" } else { trimmed };
            Some(Identifier::Numeric(digits.to_string()))
        } else {
            Some(Identifier::Text(raw.to_string()))
        }
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Identifier::Numeric(_), Identifier::Text(_)) => Ordering::Less,
            (Identifier::Text(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::Text(a), Identifier::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed module version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    release: Vec<Identifier>,
    prerelease: Vec<Identifier>,
}

impl Version {
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = || RegistryError::VersionParse(version.to_string());
        let captures = VERSION_RE.captures(version).ok_or_else(invalid)?;

        let identifiers = |part: Option<regex::Match<'_>>| -> Result<Vec<Identifier>> {
            match part {
                None => Ok(Vec::new()),
                Some(m) => {
                    m.as_str()
                        .split('.')
                        .map(|raw| Identifier::parse(raw).ok_or_else(invalid))
                        .collect()
                }
            }
        };

        Ok(Self {
            raw: version.to_string(),
            release: identifiers(captures.get(1))?,
            prerelease: identifiers(captures.get(2))?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

impl FromStr for Version {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .cmp(&other.release)
            .then_with(|| {
                match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.prerelease.cmp(&other.prerelease),
                }
            })
            // Versions differing only in leading zeros or build metadata still get a stable
            // order, so equality matches string equality.
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

/// Compares two version strings, failing if either is malformed.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Derives the version from a release tag by dropping any leading non-numeric prefix.
///
/// `v1.2.3` and `release-1.2.3` both yield `1.2.3`. A tag without digits is returned unchanged.
pub fn version_from_tag(tag: &str) -> &str {
    let stripped = tag.trim_start_matches(|c: char| !c.is_ascii_digit());
    if stripped.is_empty() {
        tag
    } else {
        stripped
    }
}
