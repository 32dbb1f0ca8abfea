// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Executor
//!
//! Drives a session's execution on the scheduler: compiles the pipeline,
//! reconciles the registered state machine, starts the execution, and
//! keeps the persisted session in step with the remote status.
//!
//! ## State-machine reconciliation
//!
//! The registered name is derived from `(pipeline_id, version)`, so repeat
//! executions of the same revision reuse the existing machine. When the
//! freshly compiled definition differs from the stored one (compared as
//! JSON value trees, key-order insensitive), the machine is updated in
//! place; if the update is rejected, a new machine is created under a
//! `-v{unix-seconds}` suffixed name.
//!
//! ## Progress accounting
//!
//! `get_execution_status` maps the remote status onto the session
//! (Running stays Running, Succeeded completes, Failed/Aborted/TimedOut
//! fail with the mapped code) and recomputes the progress counters from
//! history events: exits of `*_End` states count as job completions,
//! `TaskStateFailed` events as failures. Both are deduplicated by state
//! name so a retried operation is not double counted, and both are capped
//! at `total_jobs`.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use bunsui_domain::entities::{Pipeline, Session, SessionStatus};
use bunsui_domain::BunsuiError;

use crate::compiler::{CompiledStateMachine, StateMachineCompiler};
use crate::infrastructure::adapters::scheduler::{ExecutionStatus, ExecutionSummary, SchedulerAdapter};
use crate::infrastructure::repositories::SessionRepository;
use crate::infrastructure::resilience::RetryPolicy;

/// Executions of one pipeline plus aggregate counts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionListing {
    pub executions: Vec<ExecutionSummary>,
    pub total: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Executes pipelines on the scheduler and polls their progress.
pub struct PipelineExecutor {
    scheduler: Arc<dyn SchedulerAdapter>,
    repository: Arc<SessionRepository>,
    compiler: StateMachineCompiler,
    execution_role_arn: String,
    retry_policy: RetryPolicy,
}

impl PipelineExecutor {
    pub fn new(
        scheduler: Arc<dyn SchedulerAdapter>,
        repository: Arc<SessionRepository>,
        compiler: StateMachineCompiler,
        execution_role_arn: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            repository,
            compiler,
            execution_role_arn: execution_role_arn.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy applied to scheduler calls.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Compiles and starts `pipeline` for `session`, recording the
    /// execution identifiers and moving the session to Running.
    ///
    /// On any failure the session enters Failed with
    /// `error_code = EXECUTION_START_FAILED` and the error is returned as a
    /// Session error.
    pub async fn execute_pipeline(
        &self,
        pipeline: &Pipeline,
        session: &mut Session,
        parameters: Option<HashMap<String, Value>>,
    ) -> Result<(), BunsuiError> {
        match self.try_execute(pipeline, session, parameters).await {
            Ok(()) => Ok(()),
            Err(error) => {
                session.set_error(error.to_string(), Some("EXECUTION_START_FAILED".to_string()));
                if let Err(persist_error) = self.repository.update_session(session).await {
                    warn!(
                        session_id = session.session_id(),
                        %persist_error,
                        "failed to persist execution-start failure"
                    );
                }
                Err(BunsuiError::session(format!(
                    "Failed to start pipeline execution: {}",
                    error
                )))
            }
        }
    }

    async fn try_execute(
        &self,
        pipeline: &Pipeline,
        session: &mut Session,
        parameters: Option<HashMap<String, Value>>,
    ) -> Result<(), BunsuiError> {
        let compiled = self.compiler.compile(pipeline, &self.execution_role_arn)?;
        let state_machine_arn = self.get_or_create_state_machine(&compiled).await?;

        let input = self
            .compiler
            .execution_input(pipeline, session.session_id(), parameters);
        let execution_name = format!("session-{}-{}", session.session_id(), Utc::now().timestamp());
        let execution_arn = self
            .scheduler
            .start_execution(&state_machine_arn, Some(&execution_name), Some(&input.to_string()))
            .await?;

        session.set_pipeline_name(Some(pipeline.name().to_string()));
        session.set_execution(execution_arn, execution_name, state_machine_arn);
        if session.status() == SessionStatus::Created {
            session.transition_to(SessionStatus::Queued)?;
        }
        if session.status() == SessionStatus::Queued {
            session.transition_to(SessionStatus::Running)?;
        }
        self.repository.update_session(session).await?;
        info!(
            session_id = session.session_id(),
            pipeline_id = pipeline.pipeline_id(),
            "pipeline execution started"
        );
        Ok(())
    }

    /// Finds the state machine registered under the compiled name, updating
    /// it if its stored definition drifted; creates it when absent. Returns
    /// the arn to execute.
    pub async fn get_or_create_state_machine(&self, compiled: &CompiledStateMachine) -> Result<String, BunsuiError> {
        let machines = self.scheduler.list_state_machines(None).await?;
        match machines.into_iter().find(|m| m.name == compiled.name) {
            Some(existing) => {
                self.update_state_machine_if_needed(&existing.state_machine_arn, compiled)
                    .await
            }
            None => {
                self.scheduler
                    .create_state_machine(
                        &compiled.name,
                        &compiled.definition_json()?,
                        &compiled.role_arn,
                        Some(&compiled.description),
                        &compiled.tags,
                    )
                    .await
            }
        }
    }

    async fn update_state_machine_if_needed(
        &self,
        state_machine_arn: &str,
        compiled: &CompiledStateMachine,
    ) -> Result<String, BunsuiError> {
        let current = self.scheduler.describe_state_machine(state_machine_arn).await?;
        let stored: Value = serde_json::from_str(&current.definition)?;
        let fresh = compiled.definition.to_value()?;
        if stored == fresh {
            debug!(state_machine_arn, "definition unchanged, reusing state machine");
            return Ok(state_machine_arn.to_string());
        }

        match self
            .scheduler
            .update_state_machine(
                state_machine_arn,
                Some(&compiled.definition_json()?),
                Some(&compiled.role_arn),
                Some(&compiled.description),
            )
            .await
        {
            Ok(()) => {
                info!(state_machine_arn, "state machine definition updated");
                Ok(state_machine_arn.to_string())
            }
            Err(error) => {
                let fallback_name = format!("{}-v{}", compiled.name, Utc::now().timestamp());
                warn!(
                    state_machine_arn,
                    %error,
                    %fallback_name,
                    "state machine update failed, creating suffixed machine"
                );
                self.scheduler
                    .create_state_machine(
                        &fallback_name,
                        &compiled.definition_json()?,
                        &compiled.role_arn,
                        Some(&compiled.description),
                        &compiled.tags,
                    )
                    .await
            }
        }
    }

    /// Polls the scheduler and folds the remote status into the session.
    /// Returns the session's updated status.
    ///
    /// # Errors
    ///
    /// * `Session` - the session has no execution arn
    pub async fn get_execution_status(&self, session: &mut Session) -> Result<SessionStatus, BunsuiError> {
        let execution_arn = session
            .execution_arn()
            .ok_or_else(|| BunsuiError::session("Session has no execution ARN"))?
            .to_string();

        let description = self
            .retry_policy
            .run("describe_execution", || self.scheduler.describe_execution(&execution_arn))
            .await?;

        match description.status {
            ExecutionStatus::Starting | ExecutionStatus::Running => {
                self.refresh_progress(session, &execution_arn).await;
            }
            ExecutionStatus::Succeeded => {
                self.refresh_progress(session, &execution_arn).await;
                if session.can_transition_to(SessionStatus::Completed) {
                    session.transition_to(SessionStatus::Completed)?;
                }
            }
            ExecutionStatus::Failed | ExecutionStatus::Aborted | ExecutionStatus::TimedOut => {
                let code = match description.status {
                    ExecutionStatus::TimedOut => "TIMEOUT".to_string(),
                    other => other.to_string(),
                };
                let cause = description.cause.clone().unwrap_or_else(|| "Execution failed".to_string());
                if session.status() != SessionStatus::Failed {
                    session.set_error(cause, Some(code));
                }
            }
        }

        self.repository.update_session(session).await?;
        Ok(session.status())
    }

    /// Recomputes progress counters from execution history. Best effort: a
    /// history read failure leaves the counters untouched.
    async fn refresh_progress(&self, session: &mut Session, execution_arn: &str) {
        let events = match self.scheduler.get_execution_history(execution_arn, None, false).await {
            Ok(events) => events,
            Err(error) => {
                debug!(
                    session_id = session.session_id(),
                    %error,
                    "skipping progress refresh, history unavailable"
                );
                return;
            }
        };

        let mut completed_states: HashSet<&str> = HashSet::new();
        let mut failed_states: HashSet<String> = HashSet::new();
        for event in &events {
            match event.event_type.as_str() {
                "TaskStateExited" => {
                    if let Some(name) = event.state_name.as_deref() {
                        if name.ends_with("_End") {
                            completed_states.insert(name);
                        }
                    }
                }
                // Pass states exit through a different event type.
                "PassStateExited" => {
                    if let Some(name) = event.state_name.as_deref() {
                        if name.ends_with("_End") {
                            completed_states.insert(name);
                        }
                    }
                }
                "TaskStateFailed" => {
                    let key = event
                        .state_name
                        .clone()
                        .unwrap_or_else(|| format!("event-{}", event.event_id));
                    failed_states.insert(key);
                }
                _ => {}
            }
        }

        let total = session.total_jobs();
        let completed = (completed_states.len() as u32).min(total);
        let failed = (failed_states.len() as u32).min(total);
        session.update_progress(completed, failed);
    }

    /// Stops a running execution and cancels the session, recording the
    /// cause under `USER_CANCELLED`.
    pub async fn stop_execution(&self, session: &mut Session, cause: Option<&str>) -> Result<(), BunsuiError> {
        let execution_arn = session
            .execution_arn()
            .ok_or_else(|| BunsuiError::session("Session has no execution ARN"))?
            .to_string();
        let cause = cause.unwrap_or("User requested stop");

        self.scheduler.stop_execution(&execution_arn, None, Some(cause)).await?;

        if session.can_transition_to(SessionStatus::Cancelled) {
            session.transition_to(SessionStatus::Cancelled)?;
        }
        session.set_error_info(Some(cause.to_string()), Some("USER_CANCELLED".to_string()));
        self.repository.update_session(session).await?;
        info!(session_id = session.session_id(), "execution stopped");
        Ok(())
    }

    /// Retries a failed session's execution.
    ///
    /// # Errors
    ///
    /// * `Session` - the session is not Failed, or the retry cap is
    ///   reached (the counter is left unchanged in that case)
    pub async fn retry_failed_execution(
        &self,
        pipeline: &Pipeline,
        session: &mut Session,
        parameters: Option<HashMap<String, Value>>,
    ) -> Result<(), BunsuiError> {
        if session.status() != SessionStatus::Failed {
            return Err(BunsuiError::session("Can only retry failed executions"));
        }
        if session.retry_count() >= session.max_retries() {
            return Err(BunsuiError::session("Maximum retry count exceeded"));
        }

        session.increment_retry();
        session.reset_for_retry();
        self.repository.update_session(session).await?;
        info!(
            session_id = session.session_id(),
            retry_count = session.retry_count(),
            "retrying failed execution"
        );
        self.execute_pipeline(pipeline, session, parameters).await
    }

    /// Polls until the session reaches a terminal state or `timeout`
    /// elapses. On expiry the remote execution is stopped and the session
    /// surfaces as Timeout.
    pub async fn wait_for_completion(
        &self,
        session: &mut Session,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<SessionStatus, BunsuiError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.get_execution_status(session).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                if let Some(execution_arn) = session.execution_arn() {
                    if let Err(error) = self
                        .scheduler
                        .stop_execution(execution_arn, None, Some("Polling timeout exceeded"))
                        .await
                    {
                        warn!(
                            session_id = session.session_id(),
                            %error,
                            "failed to stop execution after polling timeout"
                        );
                    }
                }
                if session.can_transition_to(SessionStatus::Timeout) {
                    session.transition_to(SessionStatus::Timeout)?;
                }
                session.set_error_info(
                    Some("Polling timeout exceeded".to_string()),
                    Some("TIMEOUT".to_string()),
                );
                self.repository.update_session(session).await?;
                return Ok(SessionStatus::Timeout);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Lists the executions registered for a pipeline revision, with
    /// aggregate counts. A pipeline that was never executed yields an empty
    /// listing.
    pub async fn list_executions_for_pipeline(&self, pipeline: &Pipeline) -> Result<ExecutionListing, BunsuiError> {
        let compiled_name = self.compiler.compile(pipeline, &self.execution_role_arn)?.name;
        let machines = self.scheduler.list_state_machines(None).await?;
        let Some(machine) = machines.into_iter().find(|m| m.name == compiled_name) else {
            return Ok(ExecutionListing::default());
        };

        let executions = self
            .scheduler
            .list_executions(&machine.state_machine_arn, None, None)
            .await?;
        let mut listing = ExecutionListing {
            total: executions.len(),
            ..Default::default()
        };
        for execution in &executions {
            match execution.status {
                ExecutionStatus::Running | ExecutionStatus::Starting => listing.running += 1,
                ExecutionStatus::Succeeded => listing.succeeded += 1,
                ExecutionStatus::Failed | ExecutionStatus::Aborted | ExecutionStatus::TimedOut => listing.failed += 1,
            }
        }
        listing.executions = executions;
        Ok(listing)
    }
}
