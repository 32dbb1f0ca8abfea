// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error taxonomy for the bunsui orchestration
//! engine. Errors are organized by failure kind rather than by the component
//! that raised them, so that callers and the adapter retry machinery can make
//! uniform recoverability decisions.
//!
//! ## Error Kinds
//!
//! - **Validation**: an invariant was violated by the caller (bad DAG, empty
//!   pipeline id, invalid state transition, unknown table). Never retried.
//! - **Session**: session-level failures (not found, delete-while-running,
//!   retry cap exceeded).
//! - **Auth**: credentials missing or rejected by the backend.
//! - **Throttling**: the backend rate-limited us. Retried with backoff; the
//!   backend's retry-after hint is carried when present.
//! - **Timeout**: a remote call exceeded its deadline. Retried.
//! - **ServiceUnavailable**: transient backend outage. Retried.
//! - **ResourceNotFound**: a table, bucket, function, or task definition does
//!   not exist.
//! - **Configuration**: an adapter could not initialize (bad region, missing
//!   table).
//! - **Serialization** / **Internal**: infrastructure faults that are not part
//!   of the caller-facing contract but still need a home.
//!
//! Throttling, Timeout, and ServiceUnavailable are the recoverable kinds; the
//! retry policies in the engine crate consult [`BunsuiError::is_recoverable`]
//! before re-issuing a call.

use thiserror::Error;

/// Domain-specific errors for the pipeline orchestration engine.
///
/// Each variant carries a descriptive message. Stable error codes (for
/// support diagnostics persisted alongside sessions) are available via
/// [`BunsuiError::error_code`].
#[derive(Error, Debug, Clone)]
pub enum BunsuiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Throttled by backend: {message}")]
    Throttling {
        message: String,
        /// Retry-after hint from the backend, in seconds.
        retry_after: Option<u64>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BunsuiError {
    /// Creates a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Creates a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Creates a new throttling error without a retry-after hint
    pub fn throttling(msg: impl Into<String>) -> Self {
        Self::Throttling {
            message: msg.into(),
            retry_after: None,
        }
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a new service-unavailable error
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Creates a new resource-not-found error
    pub fn resource_not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    /// Creates a new configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Checks if the error is recoverable by retrying the operation.
    ///
    /// Throttling, timeouts, and transient backend outages are worth another
    /// attempt; everything else requires caller intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BunsuiError::Throttling { .. } | BunsuiError::Timeout(_) | BunsuiError::ServiceUnavailable(_)
        )
    }

    /// Gets the backend's retry-after hint, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            BunsuiError::Throttling { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            BunsuiError::Validation(_) => "validation",
            BunsuiError::Session(_) => "session",
            BunsuiError::Auth(_) => "auth",
            BunsuiError::Throttling { .. } => "throttling",
            BunsuiError::Timeout(_) => "timeout",
            BunsuiError::ServiceUnavailable(_) => "service_unavailable",
            BunsuiError::ResourceNotFound(_) => "resource_not_found",
            BunsuiError::Configuration(_) => "configuration",
            BunsuiError::Serialization(_) => "serialization",
            BunsuiError::Internal(_) => "internal",
        }
    }

    /// Gets the stable error code persisted for support diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            BunsuiError::Validation(_) => "VALIDATION_ERROR",
            BunsuiError::Session(_) => "SESSION_ERROR",
            BunsuiError::Auth(_) => "AUTH_ERROR",
            BunsuiError::Throttling { .. } => "THROTTLING_ERROR",
            BunsuiError::Timeout(_) => "TIMEOUT",
            BunsuiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            BunsuiError::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            BunsuiError::Configuration(_) => "CONFIG_ERROR",
            BunsuiError::Serialization(_) => "SERIALIZATION_ERROR",
            BunsuiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for BunsuiError {
    fn from(err: std::io::Error) -> Self {
        BunsuiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BunsuiError {
    fn from(err: serde_json::Error) -> Self {
        BunsuiError::Serialization(err.to_string())
    }
}
