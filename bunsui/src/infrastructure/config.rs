// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Configuration
//!
//! The environment knobs consumed by the core, read once at startup and
//! immutable thereafter. The richer file-based configuration loader (with
//! profiles and overrides) is an external collaborator; the engine itself
//! only needs these deployment parameters.
//!
//! | Variable | Default |
//! |---|---|
//! | `BUNSUI_REGION` | `us-east-1` |
//! | `BUNSUI_TABLE_PREFIX` | `bunsui` |
//! | `BUNSUI_BUCKET` | `bunsui-artifacts` |
//! | `BUNSUI_STATE_MACHINE_PREFIX` | `bunsui` |
//! | `BUNSUI_ENVIRONMENT` | `production` |
//! | `BUNSUI_EXECUTION_ROLE_ARN` | empty (callers supply one) |
//! | `BUNSUI_REQUEST_TIMEOUT_SECONDS` | `30` |
//! | `BUNSUI_RETRY_MAX_ATTEMPTS` | `3` |
//! | `BUNSUI_RATE_LIMIT_INTERVAL_MS` | `100` |

use std::time::Duration;

use bunsui_domain::BunsuiError;

/// Deployment configuration for the engine. Build it once and share it;
/// there is no mutation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub region: String,
    pub table_prefix: String,
    pub bucket: String,
    pub state_machine_prefix: String,
    pub environment: String,
    pub execution_role_arn: String,
    pub request_timeout: Duration,
    pub retry_max_attempts: u32,
    pub rate_limit_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            table_prefix: "bunsui".to_string(),
            bucket: "bunsui-artifacts".to_string(),
            state_machine_prefix: "bunsui".to_string(),
            environment: "production".to_string(),
            execution_role_arn: String::new(),
            request_timeout: Duration::from_secs(30),
            retry_max_attempts: 3,
            rate_limit_interval: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    /// Builds the configuration from environment variables, falling back to
    /// the documented defaults.
    ///
    /// # Errors
    ///
    /// * `Configuration` - a numeric variable is present but unparseable
    pub fn from_env() -> Result<Self, BunsuiError> {
        let defaults = Self::default();
        Ok(Self {
            region: env_or("BUNSUI_REGION", defaults.region),
            table_prefix: env_or("BUNSUI_TABLE_PREFIX", defaults.table_prefix),
            bucket: env_or("BUNSUI_BUCKET", defaults.bucket),
            state_machine_prefix: env_or("BUNSUI_STATE_MACHINE_PREFIX", defaults.state_machine_prefix),
            environment: env_or("BUNSUI_ENVIRONMENT", defaults.environment),
            execution_role_arn: env_or("BUNSUI_EXECUTION_ROLE_ARN", defaults.execution_role_arn),
            request_timeout: Duration::from_secs(env_parsed("BUNSUI_REQUEST_TIMEOUT_SECONDS", 30)?),
            retry_max_attempts: env_parsed("BUNSUI_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts as u64)? as u32,
            rate_limit_interval: Duration::from_millis(env_parsed("BUNSUI_RATE_LIMIT_INTERVAL_MS", 100)?),
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed(key: &str, default: u64) -> Result<u64, BunsuiError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| BunsuiError::configuration(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.table_prefix, "bunsui");
        assert_eq!(config.bucket, "bunsui-artifacts");
        assert_eq!(config.state_machine_prefix, "bunsui");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.rate_limit_interval, Duration::from_millis(100));
    }
}
