//! Semantic versions for persisted store data
//!
//! Every persisted document is stamped with the schema version of the store
//! that wrote it. On open, a major bump between the stored version and the
//! store's own version discards the stored data.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// `major.minor.patch`, totally ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemanticVersion {
    /// Incompatible schema changes
    pub major: u64,
    /// Compatible additions
    pub minor: u64,
    /// Fixes
    pub patch: u64,
}

impl SemanticVersion {
    /// Create a version
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion { major, minor, patch }
    }

    /// Parse `"M.m.p"`
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(StoreError::InvalidVersionFormat(raw.to_string()));
        }
        let num = |s: &str| {
            if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                return Err(StoreError::InvalidVersionFormat(raw.to_string()));
            }
            s.parse::<u64>()
                .map_err(|_| StoreError::InvalidVersionFormat(raw.to_string()))
        };
        Ok(SemanticVersion {
            major: num(parts[0])?,
            minor: num(parts[1])?,
            patch: num(parts[2])?,
        })
    }

    /// True iff `major` increased going from `from` to `self`
    pub fn is_major_bump(&self, from: &SemanticVersion) -> bool {
        self.major > from.major
    }
}

impl Default for SemanticVersion {
    fn default() -> Self {
        SemanticVersion::new(1, 0, 0)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SemanticVersion::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SemanticVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
