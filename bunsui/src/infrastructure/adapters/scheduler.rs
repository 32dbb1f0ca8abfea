// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scheduler Adapter Contract
//!
//! The scheduler is the remote workflow engine that runs compiled
//! state-machine definitions. This module defines the adapter trait the
//! session executor drives, together with the typed results it needs:
//! execution status codes, execution descriptions, and history events.
//!
//! Definitions cross this boundary as serialized JSON strings; the typed
//! definition tree lives in [`crate::compiler::states`] and is rendered at
//! this edge only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use bunsui_domain::BunsuiError;

/// Remote execution status codes used by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Starting,
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Aborted | ExecutionStatus::TimedOut
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Starting => write!(f, "STARTING"),
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::Aborted => write!(f, "ABORTED"),
            ExecutionStatus::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(ExecutionStatus::Starting),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCEEDED" => Ok(ExecutionStatus::Succeeded),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "ABORTED" => Ok(ExecutionStatus::Aborted),
            "TIMED_OUT" => Ok(ExecutionStatus::TimedOut),
            _ => Err(BunsuiError::validation(format!("Unknown execution status: {}", s))),
        }
    }
}

/// One registered state machine, as returned by listings.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineSummary {
    pub name: String,
    pub state_machine_arn: String,
    pub creation_date: DateTime<Utc>,
}

/// Full state machine description, including the stored definition JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineDetail {
    pub name: String,
    pub state_machine_arn: String,
    pub definition: String,
    pub role_arn: String,
    pub description: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

/// One execution, as returned by listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSummary {
    pub execution_arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
}

/// Full execution description used by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDescription {
    pub execution_arn: String,
    pub state_machine_arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub stop_date: Option<DateTime<Utc>>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub cause: Option<String>,
}

/// One history event of an execution. `state_name` is set for state-scoped
/// events (entered/exited/failed); the executor counts `*_End` state exits
/// as job completions and `TaskStateFailed` events as job failures.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    pub event_id: u64,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub state_name: Option<String>,
    pub error: Option<String>,
    pub cause: Option<String>,
}

/// Contract for the remote workflow scheduler.
#[async_trait]
pub trait SchedulerAdapter: Send + Sync {
    /// Registers a state machine; returns its arn.
    async fn create_state_machine(
        &self,
        name: &str,
        definition: &str,
        role_arn: &str,
        description: Option<&str>,
        tags: &HashMap<String, String>,
    ) -> Result<String, BunsuiError>;

    /// Updates an existing state machine in place. `None` fields are left
    /// unchanged.
    async fn update_state_machine(
        &self,
        state_machine_arn: &str,
        definition: Option<&str>,
        role_arn: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), BunsuiError>;

    async fn delete_state_machine(&self, state_machine_arn: &str) -> Result<(), BunsuiError>;

    async fn describe_state_machine(&self, state_machine_arn: &str) -> Result<StateMachineDetail, BunsuiError>;

    async fn list_state_machines(&self, max_results: Option<usize>) -> Result<Vec<StateMachineSummary>, BunsuiError>;

    /// Starts an execution; returns the execution arn.
    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: Option<&str>,
        input: Option<&str>,
    ) -> Result<String, BunsuiError>;

    async fn stop_execution(
        &self,
        execution_arn: &str,
        error: Option<&str>,
        cause: Option<&str>,
    ) -> Result<(), BunsuiError>;

    async fn describe_execution(&self, execution_arn: &str) -> Result<ExecutionDescription, BunsuiError>;

    async fn list_executions(
        &self,
        state_machine_arn: &str,
        status_filter: Option<ExecutionStatus>,
        max_results: Option<usize>,
    ) -> Result<Vec<ExecutionSummary>, BunsuiError>;

    /// Returns execution history events, oldest first unless `reverse_order`.
    async fn get_execution_history(
        &self,
        execution_arn: &str,
        max_results: Option<usize>,
        reverse_order: bool,
    ) -> Result<Vec<HistoryEvent>, BunsuiError>;
}
