// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Manager
//!
//! The session manager owns the session lifecycle: creation, start,
//! progress, completion, pause/resume/cancel, checkpoints, and deletion.
//! It is the only writer of session records.
//!
//! ## Concurrency contract
//!
//! One process may host many concurrent sessions, but each session's
//! mutation sequence is serialized: every mutating operation takes that
//! session's async lock before the load-mutate-persist cycle, so two
//! mutations of the same `session_id` cannot interleave in-process. Across
//! processes, the repository's conditional puts are the fence. Reads bypass
//! the lock.
//!
//! ## Callbacks
//!
//! Callbacks registered per target status run synchronously on the caller's
//! context, strictly after the transition has been durably persisted. A
//! panicking callback is caught, logged, and swallowed; it affects neither
//! later callbacks nor the caller.

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use bunsui_domain::entities::{Checkpoint, CheckpointType, Session, SessionStatus};
use bunsui_domain::BunsuiError;

use crate::infrastructure::adapters::scheduler::SchedulerAdapter;
use crate::infrastructure::repositories::SessionRepository;

/// Callback invoked after a session durably reaches a status.
pub type StatusCallback = Arc<dyn Fn(&Session) + Send + Sync>;

/// Optional fields of [`SessionManager::create_session`].
#[derive(Default, Clone)]
pub struct CreateSessionOptions {
    pub session_id: Option<String>,
    pub configuration: Option<HashMap<String, Value>>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub tags: Option<HashMap<String, String>>,
}

/// Aggregate view of one session for dashboards and the CLI layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatistics {
    pub session_id: String,
    pub pipeline_id: String,
    pub status: SessionStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub completion_percentage: f64,
    pub checkpoints_count: usize,
    pub configuration: HashMap<String, Value>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub runtime_seconds: Option<f64>,
}

/// High-level session lifecycle service.
pub struct SessionManager {
    repository: Arc<SessionRepository>,
    scheduler: Option<Arc<dyn SchedulerAdapter>>,
    callbacks: RwLock<HashMap<SessionStatus, Vec<StatusCallback>>>,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(repository: Arc<SessionRepository>) -> Self {
        Self {
            repository,
            scheduler: None,
            callbacks: RwLock::new(HashMap::new()),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a scheduler so cancellation can stop the remote execution.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerAdapter>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Creates and persists a session in Created state.
    ///
    /// # Errors
    ///
    /// * `Validation` - empty `pipeline_id` or `total_jobs < 1`
    pub async fn create_session(
        &self,
        pipeline_id: &str,
        total_jobs: u32,
        options: CreateSessionOptions,
    ) -> Result<Session, BunsuiError> {
        if pipeline_id.is_empty() {
            return Err(BunsuiError::validation("Pipeline ID is required"));
        }
        if total_jobs < 1 {
            return Err(BunsuiError::validation("Total jobs must be at least 1"));
        }

        let mut session = match options.session_id {
            Some(session_id) => Session::with_id(session_id, pipeline_id)?,
            None => Session::new(pipeline_id)?,
        };
        session.set_total_jobs(total_jobs);
        if let Some(configuration) = options.configuration {
            session.set_configuration(configuration);
        }
        if let Some(tags) = options.tags {
            session.set_tags(tags);
        }
        session.set_user(options.user_id, options.user_name);

        self.repository.create_session(&session).await?;
        info!(session_id = session.session_id(), pipeline_id, "session created");
        self.fire_callbacks(SessionStatus::Created, &session);
        Ok(session)
    }

    /// Loads a session by id.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, BunsuiError> {
        self.repository.get_session(session_id).await
    }

    /// Starts a session: Created moves through Queued to Running, a Queued
    /// session straight to Running.
    ///
    /// # Errors
    ///
    /// * `Session` - unknown session, or status outside {Created, Queued}
    pub async fn start_session(&self, session_id: &str) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;

        if !matches!(session.status(), SessionStatus::Created | SessionStatus::Queued) {
            return Err(BunsuiError::session(format!(
                "Cannot start session in {} state",
                session.status()
            )));
        }

        if session.status() == SessionStatus::Created {
            session.transition_to(SessionStatus::Queued)?;
        }
        session.transition_to(SessionStatus::Running)?;

        let mut state_data = HashMap::new();
        state_data.insert("message".to_string(), Value::from("Session started"));
        session.add_checkpoint(
            Checkpoint::new(CheckpointType::Milestone, "session", state_data).with_message("Session started"),
        );

        self.repository.update_session(&session).await?;
        info!(session_id, "session started");
        self.fire_callbacks(SessionStatus::Running, &session);
        Ok(session)
    }

    /// Updates the progress counters; a forward step appends a Milestone
    /// checkpoint named after the step.
    ///
    /// # Errors
    ///
    /// * `Validation` - `current_step` exceeds `total_jobs`
    /// * `Session` - unknown session
    pub async fn update_progress(
        &self,
        session_id: &str,
        current_step: u32,
        step_name: Option<&str>,
        step_data: Option<HashMap<String, Value>>,
    ) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;

        if current_step > session.total_jobs() {
            return Err(BunsuiError::validation(format!(
                "Invalid step number: {}",
                current_step
            )));
        }

        let previous = session.completed_jobs();
        let failed = session.failed_jobs();
        session.update_progress(current_step, failed);

        if current_step > previous {
            let job_id = step_name
                .map(String::from)
                .unwrap_or_else(|| format!("step_{}", current_step));
            session.add_checkpoint(
                Checkpoint::new(CheckpointType::Milestone, job_id, step_data.unwrap_or_default())
                    .with_message(format!("Step {} completed", current_step)),
            );
        }

        self.repository.update_session(&session).await?;
        Ok(session)
    }

    /// Completes a session: Completed on success, Failed (with the error
    /// recorded) otherwise. Always appends a final Milestone carrying the
    /// outcome and total runtime.
    ///
    /// # Errors
    ///
    /// * `Session` - unknown session, or status outside {Running, Paused}
    pub async fn complete_session(
        &self,
        session_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;

        if !matches!(session.status(), SessionStatus::Running | SessionStatus::Paused) {
            return Err(BunsuiError::session(format!(
                "Cannot complete session in {} state",
                session.status()
            )));
        }

        if success {
            session.transition_to(SessionStatus::Completed)?;
        } else {
            session.set_error(error_message.unwrap_or("Session failed"), None);
        }

        let mut state_data = HashMap::new();
        state_data.insert("success".to_string(), Value::from(success));
        state_data.insert(
            "error_message".to_string(),
            error_message.map(Value::from).unwrap_or(Value::Null),
        );
        state_data.insert(
            "total_runtime".to_string(),
            Value::from(session.duration_seconds().unwrap_or(0.0)),
        );
        session.add_checkpoint(
            Checkpoint::new(CheckpointType::Milestone, "session", state_data)
                .with_message(if success { "Session completed" } else { "Session failed" }),
        );

        self.repository.update_session(&session).await?;
        info!(session_id, success, "session completed");
        self.fire_callbacks(session.status(), &session);
        Ok(session)
    }

    /// Pauses a running session.
    pub async fn pause_session(&self, session_id: &str) -> Result<Session, BunsuiError> {
        self.simple_transition(session_id, SessionStatus::Paused, "Session paused").await
    }

    /// Resumes a paused session.
    pub async fn resume_session(&self, session_id: &str) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;
        if session.status() != SessionStatus::Paused {
            return Err(BunsuiError::session(format!(
                "Cannot resume session in {} state",
                session.status()
            )));
        }
        session.transition_to(SessionStatus::Running)?;
        let mut state_data = HashMap::new();
        state_data.insert("message".to_string(), Value::from("Session resumed"));
        session.add_checkpoint(
            Checkpoint::new(CheckpointType::Milestone, "session", state_data).with_message("Session resumed"),
        );
        self.repository.update_session(&session).await?;
        self.fire_callbacks(SessionStatus::Running, &session);
        Ok(session)
    }

    /// Cancels a session, stopping the remote execution when one is
    /// attached. Cancelling an already-cancelled session is a no-op that
    /// returns the stored state unchanged.
    ///
    /// # Errors
    ///
    /// * `Session` - unknown session, or a Completed/Failed-terminal state
    ///   that cannot be cancelled
    pub async fn cancel_session(&self, session_id: &str) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;

        if session.status() == SessionStatus::Cancelled {
            return Ok(session);
        }
        if !session.can_transition_to(SessionStatus::Cancelled) {
            return Err(BunsuiError::session(format!(
                "Cannot cancel session in {} state",
                session.status()
            )));
        }

        if let (Some(scheduler), Some(execution_arn)) = (&self.scheduler, session.execution_arn()) {
            if let Err(error) = scheduler
                .stop_execution(execution_arn, None, Some("Session cancelled"))
                .await
            {
                warn!(session_id, %error, "failed to stop remote execution during cancel");
            }
        }

        session.transition_to(SessionStatus::Cancelled)?;
        let mut state_data = HashMap::new();
        state_data.insert("message".to_string(), Value::from("Session cancelled"));
        session.add_checkpoint(
            Checkpoint::new(CheckpointType::Milestone, "session", state_data).with_message("Session cancelled"),
        );

        self.repository.update_session(&session).await?;
        info!(session_id, "session cancelled");
        self.fire_callbacks(SessionStatus::Cancelled, &session);
        Ok(session)
    }

    /// Lists sessions with optional pipeline and status filters, newest
    /// first.
    pub async fn list_sessions(
        &self,
        pipeline_id: Option<&str>,
        status: Option<SessionStatus>,
        limit: usize,
    ) -> Result<Vec<Session>, BunsuiError> {
        self.repository.list_sessions(pipeline_id, status, limit).await
    }

    /// Deletes a session. Returns false when it does not exist.
    ///
    /// # Errors
    ///
    /// * `Session` - the session is Running
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        if let Some(session) = self.repository.get_session(session_id).await? {
            if session.status() == SessionStatus::Running {
                return Err(BunsuiError::session("Cannot delete running session"));
            }
        } else {
            return Ok(false);
        }
        self.repository.delete_session(session_id).await
    }

    /// Appends a checkpoint. Returns false when the session is unknown.
    pub async fn add_checkpoint(
        &self,
        session_id: &str,
        checkpoint_type: CheckpointType,
        step_name: &str,
        data: Option<HashMap<String, Value>>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<bool, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut checkpoint = Checkpoint::new(checkpoint_type, step_name, data.unwrap_or_default());
        if let Some(message) = metadata
            .as_ref()
            .and_then(|m| m.get("message"))
            .and_then(Value::as_str)
        {
            checkpoint = checkpoint.with_message(message);
        }
        self.repository.add_checkpoint(session_id, checkpoint).await
    }

    /// All checkpoints of a session, in recorded order.
    pub async fn get_session_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, BunsuiError> {
        self.repository.get_session_checkpoints(session_id).await
    }

    /// Aggregate statistics for one session.
    pub async fn get_session_statistics(&self, session_id: &str) -> Result<SessionStatistics, BunsuiError> {
        let session = self.load(session_id).await?;
        Ok(SessionStatistics {
            session_id: session.session_id().to_string(),
            pipeline_id: session.pipeline_id().to_string(),
            status: session.status(),
            total_jobs: session.total_jobs(),
            completed_jobs: session.completed_jobs(),
            failed_jobs: session.failed_jobs(),
            completion_percentage: session.progress_percentage(),
            checkpoints_count: session.checkpoints().len(),
            configuration: session.configuration().clone(),
            started_at: session.started_at().copied(),
            completed_at: session.completed_at().copied(),
            runtime_seconds: session.duration_seconds(),
        })
    }

    /// Registers a callback fired after sessions durably reach `status`.
    pub fn register_status_callback(&self, status: SessionStatus, callback: StatusCallback) {
        self.callbacks.write().entry(status).or_default().push(callback);
    }

    async fn simple_transition(
        &self,
        session_id: &str,
        target: SessionStatus,
        message: &str,
    ) -> Result<Session, BunsuiError> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.load(session_id).await?;
        if !session.can_transition_to(target) {
            return Err(BunsuiError::session(format!(
                "Cannot transition session in {} state to {}",
                session.status(),
                target
            )));
        }
        session.transition_to(target)?;
        let mut state_data = HashMap::new();
        state_data.insert("message".to_string(), Value::from(message));
        session.add_checkpoint(Checkpoint::new(CheckpointType::Milestone, "session", state_data).with_message(message));
        self.repository.update_session(&session).await?;
        self.fire_callbacks(target, &session);
        Ok(session)
    }

    async fn load(&self, session_id: &str) -> Result<Session, BunsuiError> {
        self.repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| BunsuiError::session(format!("Session {} not found", session_id)))
    }

    async fn lock_session(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.session_locks.lock();
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    fn fire_callbacks(&self, status: SessionStatus, session: &Session) {
        let callbacks: Vec<StatusCallback> = self
            .callbacks
            .read()
            .get(&status)
            .map(|list| list.to_vec())
            .unwrap_or_default();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(session))).is_err() {
                warn!(
                    session_id = session.session_id(),
                    status = %status,
                    "status callback panicked; continuing"
                );
            }
        }
    }
}
