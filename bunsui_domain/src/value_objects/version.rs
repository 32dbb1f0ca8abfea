// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Version Value Object
//!
//! A dotted, numeric version string (`"1.0.0"`, `"2.3.17"`) identifying one
//! revision of a pipeline definition. The version is half of the pipeline's
//! identity `(pipeline_id, version)` and is the range key of the pipelines
//! table, so its string representation must sort sensibly and round-trip
//! exactly.
//!
//! Update operations bump the last dotted segment (`"1.0.3"` becomes
//! `"1.0.4"`); the other segments are caller-managed.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::BunsuiError;

/// Validated dotted version for a pipeline definition.
///
/// Invariants: at least one segment, every segment is a base-10 integer with
/// no sign and no leading whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PipelineVersion(String);

impl PipelineVersion {
    /// Parses a dotted version string.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the string is empty or any dotted segment is
    /// not a non-negative integer.
    pub fn parse(s: &str) -> Result<Self, BunsuiError> {
        if s.is_empty() {
            return Err(BunsuiError::validation("Pipeline version cannot be empty"));
        }
        for segment in s.split('.') {
            if segment.is_empty() || segment.parse::<u64>().is_err() {
                return Err(BunsuiError::validation(format!("Invalid pipeline version: {}", s)));
            }
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the version with its last dotted segment incremented.
    pub fn bumped(&self) -> Self {
        let mut segments: Vec<&str> = self.0.split('.').collect();
        let last: u64 = segments
            .last()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let bumped = (last + 1).to_string();
        let len = segments.len();
        segments[len - 1] = &bumped;
        Self(segments.join("."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PipelineVersion {
    fn default() -> Self {
        Self("1.0.0".to_string())
    }
}

impl Display for PipelineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineVersion {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PipelineVersion {
    type Error = BunsuiError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PipelineVersion> for String {
    fn from(v: PipelineVersion) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_dotted_numeric() {
        assert_eq!(PipelineVersion::parse("1.0.0").unwrap().as_str(), "1.0.0");
        assert_eq!(PipelineVersion::parse("2").unwrap().as_str(), "2");
        assert_eq!(PipelineVersion::parse("0.10.42").unwrap().as_str(), "0.10.42");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PipelineVersion::parse("").is_err());
        assert!(PipelineVersion::parse("1..0").is_err());
        assert!(PipelineVersion::parse("1.0.x").is_err());
        assert!(PipelineVersion::parse("v1.0.0").is_err());
        assert!(PipelineVersion::parse("1.0.-3").is_err());
    }

    #[test]
    fn test_bumped_increments_patch_segment() {
        assert_eq!(PipelineVersion::parse("1.0.0").unwrap().bumped().as_str(), "1.0.1");
        assert_eq!(PipelineVersion::parse("1.0.9").unwrap().bumped().as_str(), "1.0.10");
        assert_eq!(PipelineVersion::parse("3").unwrap().bumped().as_str(), "4");
    }

    #[test]
    fn test_default_is_one_dot_oh() {
        assert_eq!(PipelineVersion::default().as_str(), "1.0.0");
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let v = PipelineVersion::parse("1.2.3").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let back: PipelineVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<PipelineVersion>("\"not-a-version\"").is_err());
    }
}
