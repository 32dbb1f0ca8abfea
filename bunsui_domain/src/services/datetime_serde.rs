// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DateTime Serde Module
//!
//! RFC3339-compliant serialization and deserialization for `DateTime<Utc>`
//! fields across the engine. All timestamps are normalized to UTC and
//! serialized as strings (`2024-01-15T10:30:45.123Z` style), which is also
//! the representation the tabular store and the log record format require.
//!
//! Use with the `#[serde(with = "...")]` attribute:
//!
//! ```ignore
//! #[serde(with = "datetime_serde")]
//! created_at: DateTime<Utc>,
//! #[serde(with = "datetime_serde::optional")]
//! completed_at: Option<DateTime<Utc>>,
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Serializes a `DateTime<Utc>` to an RFC3339 string.
pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let rfc3339_string = dt.to_rfc3339();
    serializer.serialize_str(&rfc3339_string)
}

/// Deserializes an RFC3339 datetime string to `DateTime<Utc>`.
///
/// Offsets other than UTC are accepted and converted.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// RFC3339 serialization for `Option<DateTime<Utc>>` fields.
///
/// `Some(datetime)` serializes to an RFC3339 string, `None` to null.
pub mod optional {
    use super::*;

    pub fn serialize<S>(opt_dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match opt_dt {
            Some(dt) => {
                let rfc3339_string = dt.to_rfc3339();
                serializer.serialize_some(&rfc3339_string)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s: Option<String> = Option::deserialize(deserializer)?;
        match opt_s {
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
