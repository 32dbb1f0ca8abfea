// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Entity
//!
//! A `Session` is one execution instance of a pipeline. It owns an ordered
//! list of [`Checkpoint`]s, carries progress counters, execution identifiers
//! handed back by the scheduler, and the lifecycle state machine below.
//!
//! ## Transition table
//!
//! | From \ To | Queued | Running | Paused | Completed | Failed | Cancelled | Timeout |
//! |-----------|--------|---------|--------|-----------|--------|-----------|---------|
//! | Created   | yes    |         |        |           |        | yes       |         |
//! | Queued    |        | yes     |        |           |        | yes       |         |
//! | Running   |        |         | yes    | yes       | yes    | yes       | yes     |
//! | Paused    |        | yes     |        |           |        | yes       |         |
//! | Failed    | yes    |         |        |           |        | yes       |         |
//! | Timeout   | yes    |         |        |           |        | yes       |         |
//!
//! Completed and Cancelled are terminal. The first transition to Running
//! stamps `started_at`; any transition to a terminal state stamps
//! `completed_at` and appends a Milestone checkpoint with `job_id =
//! "session"` whose `state_data` records the final counters. `updated_at` is
//! reset by every mutation.
//!
//! Checkpoints are append-only, so any reader observes them in nondecreasing
//! `created_at` order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::services::datetime_serde;
use crate::BunsuiError;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl SessionStatus {
    /// True for states that stamp `completed_at` when entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled | SessionStatus::Timeout
        )
    }

    /// True while the session occupies the scheduler.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Queued | SessionStatus::Running)
    }

    /// Checks whether a transition from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        match self {
            SessionStatus::Created => matches!(target, SessionStatus::Queued | SessionStatus::Cancelled),
            SessionStatus::Queued => matches!(target, SessionStatus::Running | SessionStatus::Cancelled),
            SessionStatus::Running => matches!(
                target,
                SessionStatus::Paused
                    | SessionStatus::Completed
                    | SessionStatus::Failed
                    | SessionStatus::Cancelled
                    | SessionStatus::Timeout
            ),
            SessionStatus::Paused => matches!(target, SessionStatus::Running | SessionStatus::Cancelled),
            // Retry edges
            SessionStatus::Failed | SessionStatus::Timeout => {
                matches!(target, SessionStatus::Queued | SessionStatus::Cancelled)
            }
            SessionStatus::Completed | SessionStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Created => write!(f, "created"),
            SessionStatus::Queued => write!(f, "queued"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
            SessionStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(SessionStatus::Created),
            "queued" => Ok(SessionStatus::Queued),
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "timeout" => Ok(SessionStatus::Timeout),
            _ => Err(BunsuiError::validation(format!("Unknown session status: {}", s))),
        }
    }
}

/// The reason a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointType {
    Manual,
    Automatic,
    Error,
    Milestone,
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointType::Manual => write!(f, "manual"),
            CheckpointType::Automatic => write!(f, "automatic"),
            CheckpointType::Error => write!(f, "error"),
            CheckpointType::Milestone => write!(f, "milestone"),
        }
    }
}

/// A durable recovery marker on a session.
///
/// `job_id` names the job the checkpoint belongs to, or the literal
/// `"session"` for lifecycle milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub checkpoint_type: CheckpointType,
    pub job_id: String,
    pub operation_id: Option<String>,
    #[serde(with = "datetime_serde")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub state_data: HashMap<String, Value>,
    pub message: Option<String>,
}

impl Checkpoint {
    /// Creates a checkpoint with a generated id and the current time.
    pub fn new(
        checkpoint_type: CheckpointType,
        job_id: impl Into<String>,
        state_data: HashMap<String, Value>,
    ) -> Self {
        Self {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            checkpoint_type,
            job_id: job_id.into(),
            operation_id: None,
            created_at: chrono::Utc::now(),
            state_data,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}

/// One execution instance of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    // Identity fields (always first)
    session_id: String,
    pipeline_id: String,
    pipeline_name: Option<String>,

    // Status and lifecycle
    status: SessionStatus,

    // Execution details
    execution_arn: Option<String>,
    execution_name: Option<String>,
    state_machine_arn: Option<String>,

    // Progress tracking
    total_jobs: u32,
    completed_jobs: u32,
    failed_jobs: u32,

    // Error handling
    error_message: Option<String>,
    error_code: Option<String>,
    retry_count: u32,
    max_retries: u32,

    // Configuration and checkpoints
    #[serde(default)]
    configuration: HashMap<String, Value>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    checkpoints: Vec<Checkpoint>,

    // User context
    user_id: Option<String>,
    user_name: Option<String>,
    environment: Option<String>,
    region: Option<String>,

    // Metadata fields (always last)
    #[serde(with = "datetime_serde")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde")]
    updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde::optional")]
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(with = "datetime_serde::optional")]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Session {
    /// Creates a session in Created state with a generated id.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `pipeline_id` is empty
    pub fn new(pipeline_id: impl Into<String>) -> Result<Self, BunsuiError> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), pipeline_id)
    }

    /// Creates a session with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `session_id` or `pipeline_id` is empty
    pub fn with_id(session_id: impl Into<String>, pipeline_id: impl Into<String>) -> Result<Self, BunsuiError> {
        let session_id = session_id.into();
        let pipeline_id = pipeline_id.into();
        if session_id.is_empty() {
            return Err(BunsuiError::validation("Session id cannot be empty"));
        }
        if pipeline_id.is_empty() {
            return Err(BunsuiError::validation("Pipeline id is required"));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            session_id,
            pipeline_id,
            pipeline_name: None,
            status: SessionStatus::Created,
            execution_arn: None,
            execution_name: None,
            state_machine_arn: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            error_message: None,
            error_code: None,
            retry_count: 0,
            max_retries: 3,
            configuration: HashMap::new(),
            tags: HashMap::new(),
            checkpoints: Vec::new(),
            user_id: None,
            user_name: None,
            environment: None,
            region: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn execution_arn(&self) -> Option<&str> {
        self.execution_arn.as_deref()
    }

    pub fn execution_name(&self) -> Option<&str> {
        self.execution_name.as_deref()
    }

    pub fn state_machine_arn(&self) -> Option<&str> {
        self.state_machine_arn.as_deref()
    }

    pub fn total_jobs(&self) -> u32 {
        self.total_jobs
    }

    pub fn completed_jobs(&self) -> u32 {
        self.completed_jobs
    }

    pub fn failed_jobs(&self) -> u32 {
        self.failed_jobs
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn configuration(&self) -> &HashMap<String, Value> {
        &self.configuration
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
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

    pub fn set_pipeline_name(&mut self, pipeline_name: Option<String>) {
        self.pipeline_name = pipeline_name;
        self.touch();
    }

    pub fn set_total_jobs(&mut self, total_jobs: u32) {
        self.total_jobs = total_jobs;
        self.touch();
    }

    pub fn set_configuration(&mut self, configuration: HashMap<String, Value>) {
        self.configuration = configuration;
        self.touch();
    }

    pub fn set_tags(&mut self, tags: HashMap<String, String>) {
        self.tags = tags;
        self.touch();
    }

    pub fn set_user(&mut self, user_id: Option<String>, user_name: Option<String>) {
        self.user_id = user_id;
        self.user_name = user_name;
        self.touch();
    }

    pub fn set_environment(&mut self, environment: Option<String>, region: Option<String>) {
        self.environment = environment;
        self.region = region;
        self.touch();
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
        self.touch();
    }

    /// Records the scheduler identifiers for the running execution.
    pub fn set_execution(
        &mut self,
        execution_arn: impl Into<String>,
        execution_name: impl Into<String>,
        state_machine_arn: impl Into<String>,
    ) {
        self.execution_arn = Some(execution_arn.into());
        self.execution_name = Some(execution_name.into());
        self.state_machine_arn = Some(state_machine_arn.into());
        self.touch();
    }

    /// Updates the progress counters.
    pub fn update_progress(&mut self, completed_jobs: u32, failed_jobs: u32) {
        self.completed_jobs = completed_jobs;
        self.failed_jobs = failed_jobs;
        self.touch();
    }

    /// Appends a checkpoint and returns a reference to it.
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) -> &Checkpoint {
        self.checkpoints.push(checkpoint);
        self.touch();
        self.checkpoints.last().expect("checkpoint just pushed")
    }

    /// The most recently created checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().max_by_key(|c| c.created_at)
    }

    /// All checkpoints recorded for a specific job.
    pub fn checkpoints_for_job(&self, job_id: &str) -> Vec<&Checkpoint> {
        self.checkpoints.iter().filter(|c| c.job_id == job_id).collect()
    }

    /// Records a failure and forces the session into Failed.
    ///
    /// This bypasses the transition table: error assignment drives the status
    /// directly, mirroring how remote failures are surfaced regardless of the
    /// state the poller last observed.
    pub fn set_error(&mut self, error_message: impl Into<String>, error_code: Option<String>) {
        self.error_message = Some(error_message.into());
        self.error_code = error_code;
        self.status = SessionStatus::Failed;
        let now = chrono::Utc::now();
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Records error fields without touching the status. Used where the
    /// status is driven separately, e.g. a cancellation that stores its
    /// cause alongside the Cancelled state.
    pub fn set_error_info(&mut self, error_message: Option<String>, error_code: Option<String>) {
        self.error_message = error_message;
        self.error_code = error_code;
        self.touch();
    }

    /// Clears any recorded failure.
    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.error_code = None;
        self.touch();
    }

    /// Increments the retry counter and returns the new value.
    pub fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.touch();
        self.retry_count
    }

    /// Re-arms a failed session for another execution attempt: clears the
    /// execution identifiers, error fields, and run timestamps, and resets
    /// the status to Created. The retry counter is left untouched.
    pub fn reset_for_retry(&mut self) {
        self.status = SessionStatus::Created;
        self.execution_arn = None;
        self.execution_name = None;
        self.state_machine_arn = None;
        self.error_message = None;
        self.error_code = None;
        self.started_at = None;
        self.completed_at = None;
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Checks whether this session may move to `target`.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        self.status.can_transition_to(target)
    }

    /// Transitions the session to `target`.
    ///
    /// The first transition to Running stamps `started_at`. Any transition to
    /// a terminal state stamps `completed_at` and appends a Milestone
    /// checkpoint carrying the final counters.
    ///
    /// # Errors
    ///
    /// * `Validation` - if the transition table forbids the move
    pub fn transition_to(&mut self, target: SessionStatus) -> Result<(), BunsuiError> {
        if !self.can_transition_to(target) {
            return Err(BunsuiError::validation(format!(
                "Cannot transition session {} from {} to {}",
                self.session_id, self.status, target
            )));
        }

        let now = chrono::Utc::now();
        if target == SessionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        } else if target.is_terminal() {
            self.completed_at = Some(now);
        }

        self.status = target;
        self.updated_at = now;

        if target.is_terminal() {
            let mut state_data = HashMap::new();
            state_data.insert("status".to_string(), Value::String(target.to_string()));
            state_data.insert("total_jobs".to_string(), Value::from(self.total_jobs));
            state_data.insert("completed_jobs".to_string(), Value::from(self.completed_jobs));
            state_data.insert("failed_jobs".to_string(), Value::from(self.failed_jobs));
            let checkpoint = Checkpoint::new(CheckpointType::Milestone, "session", state_data)
                .with_message(format!("Session transitioned to {}", target));
            self.checkpoints.push(checkpoint);
        }

        Ok(())
    }

    /// Seconds from `started_at` to `completed_at`, or to now for a session
    /// that is still running. None before the session starts.
    pub fn duration_seconds(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(chrono::Utc::now);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Completion percentage over `total_jobs`.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            f64::from(self.completed_jobs) / f64::from(self.total_jobs) * 100.0
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut s = Session::with_id("s-1", "p-1").unwrap();
        s.set_total_jobs(3);
        s
    }

    #[test]
    fn test_transition_table() {
        let table = [
            (SessionStatus::Created, SessionStatus::Queued, true),
            (SessionStatus::Created, SessionStatus::Running, false),
            (SessionStatus::Created, SessionStatus::Cancelled, true),
            (SessionStatus::Queued, SessionStatus::Running, true),
            (SessionStatus::Queued, SessionStatus::Paused, false),
            (SessionStatus::Running, SessionStatus::Paused, true),
            (SessionStatus::Running, SessionStatus::Completed, true),
            (SessionStatus::Running, SessionStatus::Failed, true),
            (SessionStatus::Running, SessionStatus::Timeout, true),
            (SessionStatus::Paused, SessionStatus::Running, true),
            (SessionStatus::Paused, SessionStatus::Completed, false),
            (SessionStatus::Failed, SessionStatus::Queued, true),
            (SessionStatus::Failed, SessionStatus::Cancelled, true),
            (SessionStatus::Timeout, SessionStatus::Queued, true),
            (SessionStatus::Completed, SessionStatus::Running, false),
            (SessionStatus::Cancelled, SessionStatus::Queued, false),
        ];
        for (from, to, expected) in table {
            assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_lifecycle_stamps_and_milestones() {
        let mut s = session();
        s.transition_to(SessionStatus::Queued).unwrap();
        s.transition_to(SessionStatus::Running).unwrap();
        assert!(s.started_at().is_some());
        assert!(s.completed_at().is_none());

        s.update_progress(3, 0);
        s.transition_to(SessionStatus::Completed).unwrap();
        assert!(s.completed_at().is_some());
        assert!(s.is_terminal());

        let milestone = s.latest_checkpoint().unwrap();
        assert_eq!(milestone.checkpoint_type, CheckpointType::Milestone);
        assert_eq!(milestone.job_id, "session");
        assert_eq!(milestone.state_data.get("status"), Some(&Value::from("completed")));
        assert_eq!(milestone.state_data.get("completed_jobs"), Some(&Value::from(3)));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut s = session();
        let err = s.transition_to(SessionStatus::Running).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(s.status(), SessionStatus::Created);
        assert!(!s.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut s = session();
        s.transition_to(SessionStatus::Cancelled).unwrap();
        for target in [
            SessionStatus::Queued,
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Cancelled,
        ] {
            assert!(!s.can_transition_to(target));
        }
    }

    #[test]
    fn test_progress_percentage() {
        let mut s = session();
        assert_eq!(s.progress_percentage(), 0.0);
        s.update_progress(2, 0);
        assert!((s.progress_percentage() - 66.666).abs() < 0.01);
        s.update_progress(3, 0);
        assert_eq!(s.progress_percentage(), 100.0);
    }

    #[test]
    fn test_set_error_forces_failed_and_stamps_completion() {
        let mut s = session();
        s.transition_to(SessionStatus::Queued).unwrap();
        s.transition_to(SessionStatus::Running).unwrap();
        s.set_error("execution exploded", Some("EXECUTION_START_FAILED".to_string()));
        assert_eq!(s.status(), SessionStatus::Failed);
        assert_eq!(s.error_code(), Some("EXECUTION_START_FAILED"));
        assert!(s.completed_at().is_some());
    }

    #[test]
    fn test_reset_for_retry_clears_execution_state() {
        let mut s = session();
        s.transition_to(SessionStatus::Queued).unwrap();
        s.transition_to(SessionStatus::Running).unwrap();
        s.set_execution("arn:exec", "session-s-1-1", "arn:sm");
        s.set_error("boom", None);
        s.increment_retry();

        s.reset_for_retry();
        assert_eq!(s.status(), SessionStatus::Created);
        assert!(s.execution_arn().is_none());
        assert!(s.error_message().is_none());
        assert!(s.started_at().is_none());
        assert_eq!(s.retry_count(), 1);
    }

    #[test]
    fn test_checkpoints_are_ordered_and_queryable() {
        let mut s = session();
        s.add_checkpoint(Checkpoint::new(CheckpointType::Automatic, "job-a", HashMap::new()));
        s.add_checkpoint(
            Checkpoint::new(CheckpointType::Error, "job-b", HashMap::new()).with_message("shard failed"),
        );
        s.add_checkpoint(Checkpoint::new(CheckpointType::Manual, "job-a", HashMap::new()));

        assert_eq!(s.checkpoints().len(), 3);
        assert_eq!(s.checkpoints_for_job("job-a").len(), 2);
        for pair in s.checkpoints().windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let mut s = session();
        s.set_pipeline_name(Some("nightly".to_string()));
        s.set_user(Some("u-1".to_string()), Some("dana".to_string()));
        s.transition_to(SessionStatus::Queued).unwrap();
        s.transition_to(SessionStatus::Running).unwrap();
        s.add_checkpoint(Checkpoint::new(CheckpointType::Milestone, "session", HashMap::new()));

        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
