// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Entity
//!
//! An `Operation` is a single remote invocation inside a job: a
//! function-as-a-service call, a container task, or a pass-through. The
//! operation kind is a closed enum ([`OperationType`]) and every kind shares
//! one configuration record ([`OperationConfig`]); the compiler matches on
//! the kind exhaustively when it emits task states.
//!
//! ## Invariants
//!
//! - A Lambda operation's `resource_arn` names a function
//!   (`arn:aws:lambda:...`).
//! - An ECS operation's `resource_arn` names a task definition
//!   (`arn:aws:ecs:...`) and its `parameters` carry a non-empty `cluster`.
//! - Timeouts are strictly positive.
//!
//! Kinds other than Lambda and ECS compile to skipped pass-through states;
//! they are representable so that pipeline definitions written for later
//! integrations still validate and round-trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::services::datetime_serde;
use crate::BunsuiError;

/// The kind of remote invocation an operation performs.
///
/// Serialized with lowercase tags (`"lambda"`, `"ecs"`, ...), which is also
/// the `operation_type` field of the persisted configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Function-as-a-service invocation
    Lambda,
    /// Synchronous container task
    Ecs,
    /// Managed ETL job (compiles to a pass-through)
    Glue,
    /// Managed cluster step (compiles to a pass-through)
    Emr,
    /// Managed training/inference job (compiles to a pass-through)
    Sagemaker,
    /// Caller-defined invocation (compiles to a pass-through)
    Custom,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Lambda => write!(f, "lambda"),
            OperationType::Ecs => write!(f, "ecs"),
            OperationType::Glue => write!(f, "glue"),
            OperationType::Emr => write!(f, "emr"),
            OperationType::Sagemaker => write!(f, "sagemaker"),
            OperationType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for OperationType {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lambda" => Ok(OperationType::Lambda),
            "ecs" => Ok(OperationType::Ecs),
            "glue" => Ok(OperationType::Glue),
            "emr" => Ok(OperationType::Emr),
            "sagemaker" => Ok(OperationType::Sagemaker),
            "custom" => Ok(OperationType::Custom),
            _ => Err(BunsuiError::validation(format!("Unknown operation type: {}", s))),
        }
    }
}

/// Shared configuration record for every operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub operation_type: OperationType,
    pub resource_arn: Option<String>,
    pub timeout_seconds: u32,
    pub retry_count: u32,
    pub retry_delay_seconds: u32,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OperationConfig {
    /// Creates a configuration with the defaults for the given kind.
    ///
    /// Lambda invocations default to a 300 second timeout, container tasks
    /// to 3600 seconds. Both default to 3 retries spaced 60 seconds apart.
    pub fn new(operation_type: OperationType) -> Self {
        let timeout_seconds = match operation_type {
            OperationType::Ecs => 3600,
            _ => 300,
        };
        Self {
            operation_type,
            resource_arn: None,
            timeout_seconds,
            retry_count: 3,
            retry_delay_seconds: 60,
            parameters: HashMap::new(),
            environment_variables: HashMap::new(),
            tags: HashMap::new(),
        }
    }
}

/// A single remote invocation within a job.
///
/// Operations are owned by value by their job. `operation_id` is unique
/// within the pipeline and becomes part of compiled state names
/// (`Operation_<op_id>`), so it is validated as non-empty at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    operation_id: String,
    name: String,
    description: Option<String>,
    config: OperationConfig,
    #[serde(with = "datetime_serde")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde")]
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl Operation {
    /// Creates an operation from an explicit configuration.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `operation_id` or `name` is empty
    pub fn new(
        operation_id: impl Into<String>,
        name: impl Into<String>,
        config: OperationConfig,
    ) -> Result<Self, BunsuiError> {
        let operation_id = operation_id.into();
        let name = name.into();
        if operation_id.is_empty() {
            return Err(BunsuiError::validation("Operation id cannot be empty"));
        }
        if name.is_empty() {
            return Err(BunsuiError::validation("Operation name cannot be empty"));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            operation_id,
            name,
            description: None,
            config,
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates a Lambda operation targeting the given function.
    pub fn lambda(
        operation_id: impl Into<String>,
        name: impl Into<String>,
        function_arn: impl Into<String>,
    ) -> Result<Self, BunsuiError> {
        let mut config = OperationConfig::new(OperationType::Lambda);
        config.resource_arn = Some(function_arn.into());
        Self::new(operation_id, name, config)
    }

    /// Creates an ECS operation targeting the given task definition on the
    /// given cluster.
    pub fn ecs(
        operation_id: impl Into<String>,
        name: impl Into<String>,
        task_definition_arn: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Result<Self, BunsuiError> {
        let mut config = OperationConfig::new(OperationType::Ecs);
        config.resource_arn = Some(task_definition_arn.into());
        config
            .parameters
            .insert("cluster".to_string(), Value::String(cluster.into()));
        Self::new(operation_id, name, config)
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    pub fn operation_type(&self) -> OperationType {
        self.config.operation_type
    }

    pub fn created_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.created_at
    }

    pub fn updated_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.updated_at
    }

    /// Sets the free-form description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.updated_at = chrono::Utc::now();
    }

    /// Replaces the operation configuration.
    pub fn update_config(&mut self, config: OperationConfig) {
        self.config = config;
        self.updated_at = chrono::Utc::now();
    }

    /// Validates the per-kind invariants of this operation.
    ///
    /// # Errors
    ///
    /// * `Validation` - missing or mismatched `resource_arn`, missing ECS
    ///   `cluster` parameter, or a zero timeout
    pub fn validate(&self) -> Result<(), BunsuiError> {
        if self.config.timeout_seconds == 0 {
            return Err(BunsuiError::validation(format!(
                "Operation {} must have a positive timeout",
                self.operation_id
            )));
        }

        match self.config.operation_type {
            OperationType::Lambda => {
                let arn = self.config.resource_arn.as_deref().unwrap_or_default();
                if !arn.starts_with("arn:aws:lambda:") {
                    return Err(BunsuiError::validation(format!(
                        "Operation {} must reference a Lambda function arn",
                        self.operation_id
                    )));
                }
            }
            OperationType::Ecs => {
                let arn = self.config.resource_arn.as_deref().unwrap_or_default();
                if !arn.starts_with("arn:aws:ecs:") {
                    return Err(BunsuiError::validation(format!(
                        "Operation {} must reference an ECS task definition arn",
                        self.operation_id
                    )));
                }
                let cluster = self
                    .config
                    .parameters
                    .get("cluster")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if cluster.is_empty() {
                    return Err(BunsuiError::validation(format!(
                        "Operation {} requires a 'cluster' parameter",
                        self.operation_id
                    )));
                }
            }
            // Pass-through kinds carry no resource requirements.
            _ => {}
        }

        Ok(())
    }
}
