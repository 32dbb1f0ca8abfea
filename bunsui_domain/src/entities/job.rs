// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Entity
//!
//! A `Job` is one node of a pipeline's DAG: a named sequence of operations
//! plus a set of dependencies on other jobs in the same pipeline. Jobs carry
//! their own lifecycle state machine; the transition table lives in
//! [`JobStatus::can_transition_to`] and every mutation goes through
//! [`Job::transition_to`], which stamps `started_at` on the first move to
//! Running and `completed_at` on any move to a terminal state.
//!
//! ## Transition table
//!
//! | From \ To | Running | Completed | Failed | Cancelled | Timeout |
//! |-----------|---------|-----------|--------|-----------|---------|
//! | Pending   | yes     |           |        | yes       |         |
//! | Running   |         | yes       | yes    | yes       | yes     |
//! | Failed    | yes     |           |        |           |         |
//! | Timeout   | yes     |           |        |           |         |
//!
//! Completed and Cancelled are terminal; Failed and Timeout re-enter Running
//! on retry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::entities::Operation;
use crate::services::datetime_serde;
use crate::BunsuiError;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// True for states that set `completed_at` when entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    /// Checks whether a transition from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(target, JobStatus::Running | JobStatus::Cancelled),
            JobStatus::Running => matches!(
                target,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
            ),
            // Retry edges
            JobStatus::Failed | JobStatus::Timeout => matches!(target, JobStatus::Running),
            JobStatus::Completed | JobStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "timeout" => Ok(JobStatus::Timeout),
            _ => Err(BunsuiError::validation(format!("Unknown job status: {}", s))),
        }
    }
}

/// One node of a pipeline DAG.
///
/// `job_id` is unique within the owning pipeline and appears in compiled
/// state names (`Job_<id>_Start`). Dependencies are ids of other jobs in the
/// same pipeline; the pipeline validates that they resolve and that the
/// resulting graph is acyclic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    // Identity fields (always first)
    job_id: String,
    name: String,

    // Core business fields
    description: Option<String>,
    operations: Vec<Operation>,
    dependencies: BTreeSet<String>,
    status: JobStatus,
    timeout_seconds: u32,
    retry_count: u32,
    retry_delay_seconds: u32,

    // Execution details
    execution_arn: Option<String>,
    state_machine_arn: Option<String>,
    error_message: Option<String>,
    error_code: Option<String>,

    // Metadata fields (always last)
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    #[serde(with = "datetime_serde")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde")]
    updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde::optional")]
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(with = "datetime_serde::optional")]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    /// Creates a pending job with no operations and no dependencies.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `job_id` or `name` is empty
    pub fn new(job_id: impl Into<String>, name: impl Into<String>) -> Result<Self, BunsuiError> {
        let job_id = job_id.into();
        let name = name.into();
        if job_id.is_empty() {
            return Err(BunsuiError::validation("Job id cannot be empty"));
        }
        if name.is_empty() {
            return Err(BunsuiError::validation("Job name cannot be empty"));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            job_id,
            name,
            description: None,
            operations: Vec::new(),
            dependencies: BTreeSet::new(),
            status: JobStatus::Pending,
            timeout_seconds: 3600,
            retry_count: 3,
            retry_delay_seconds: 60,
            execution_arn: None,
            state_machine_arn: None,
            error_message: None,
            error_code: None,
            tags: HashMap::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay_seconds(&self) -> u32 {
        self.retry_delay_seconds
    }

    pub fn execution_arn(&self) -> Option<&str> {
        self.execution_arn.as_deref()
    }

    pub fn state_machine_arn(&self) -> Option<&str> {
        self.state_machine_arn.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.created_at
    }

    pub fn updated_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.updated_at
    }

    pub fn started_at(&self) -> Option<&chrono::DateTime<chrono::Utc>> {
        self.started_at.as_ref()
    }

    pub fn completed_at(&self) -> Option<&chrono::DateTime<chrono::Utc>> {
        self.completed_at.as_ref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.updated_at = chrono::Utc::now();
    }

    /// Sets the retry tuning for this job.
    pub fn set_retry(&mut self, retry_count: u32, retry_delay_seconds: u32) {
        self.retry_count = retry_count;
        self.retry_delay_seconds = retry_delay_seconds;
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u32) {
        self.timeout_seconds = timeout_seconds;
        self.updated_at = chrono::Utc::now();
    }

    /// Appends an operation to the job.
    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
        self.updated_at = chrono::Utc::now();
    }

    /// Removes an operation by id. Returns whether one was removed.
    pub fn remove_operation(&mut self, operation_id: &str) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| op.operation_id() != operation_id);
        let removed = self.operations.len() != before;
        if removed {
            self.updated_at = chrono::Utc::now();
        }
        removed
    }

    /// Gets an operation by id.
    pub fn get_operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.operation_id() == operation_id)
    }

    /// Adds a dependency on another job.
    pub fn add_dependency(&mut self, job_id: impl Into<String>) {
        if self.dependencies.insert(job_id.into()) {
            self.updated_at = chrono::Utc::now();
        }
    }

    /// Removes a dependency. Returns whether one was removed.
    pub fn remove_dependency(&mut self, job_id: &str) -> bool {
        let removed = self.dependencies.remove(job_id);
        if removed {
            self.updated_at = chrono::Utc::now();
        }
        removed
    }

    pub fn has_dependency(&self, job_id: &str) -> bool {
        self.dependencies.contains(job_id)
    }

    /// True when every dependency of this job appears in `completed`.
    pub fn can_start(&self, completed: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Records the scheduler identifiers for this job's execution.
    pub fn set_execution(&mut self, execution_arn: Option<String>, state_machine_arn: Option<String>) {
        self.execution_arn = execution_arn;
        self.state_machine_arn = state_machine_arn;
        self.updated_at = chrono::Utc::now();
    }

    /// Records a failure and forces the job into Failed.
    pub fn set_error(&mut self, error_message: impl Into<String>, error_code: Option<String>) {
        self.error_message = Some(error_message.into());
        self.error_code = error_code;
        self.status = JobStatus::Failed;
        let now = chrono::Utc::now();
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Clears any recorded failure.
    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.error_code = None;
        self.updated_at = chrono::Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Checks whether this job may move to `target`.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        self.status.can_transition_to(target)
    }

    /// Transitions the job to `target`.
    ///
    /// The first transition to Running stamps `started_at`; any transition to
    /// a terminal state stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// * `Validation` - if the transition table forbids the move
    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), BunsuiError> {
        if !self.can_transition_to(target) {
            return Err(BunsuiError::validation(format!(
                "Invalid job status transition from {} to {}",
                self.status, target
            )));
        }

        let now = chrono::Utc::now();
        if target == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        } else if target.is_terminal() {
            self.completed_at = Some(now);
        }

        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Duration between `started_at` and `completed_at`, when both are set.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
