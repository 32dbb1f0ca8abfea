//! # Pipeline Executor Tests
//!
//! Exercises the execution path against the in-memory scheduler: starting
//! executions, state-machine reconciliation (reuse, in-place update, and
//! the suffixed-create fallback), status polling with progress accounting,
//! cancellation, retry caps, and the poll-to-completion timeout.

mod common;

use std::time::Duration;

use bunsui::infrastructure::adapters::scheduler::{ExecutionStatus, SchedulerAdapter};
use bunsui::session::CreateSessionOptions;
use bunsui_domain::entities::SessionStatus;

use common::{harness, lambda_pipeline};

async fn started_session(h: &common::TestHarness, session_id: &str) -> bunsui_domain::entities::Session {
    h.services
        .session_manager
        .create_session(
            "P1",
            3,
            CreateSessionOptions {
                session_id: Some(session_id.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_execute_pipeline_starts_execution() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[]), ("B", &["A"]), ("C", &["B"])]);
    let mut session = started_session(&h, "S1").await;

    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();

    assert_eq!(session.status(), SessionStatus::Running);
    assert!(session.started_at().is_some());
    assert!(session.execution_arn().is_some());
    assert!(session.state_machine_arn().is_some());
    assert!(session.execution_name().unwrap().starts_with("session-S1-"));
    assert_eq!(session.pipeline_name(), Some("pipeline P1"));

    // The stored session carries the execution identifiers too.
    let stored = h.services.sessions.get_session("S1").await.unwrap().unwrap();
    assert_eq!(stored.execution_arn(), session.execution_arn());

    // The registered machine is named for the pipeline revision.
    let machines = h.scheduler.list_state_machines(None).await.unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].name, "bunsui-P1-1.0.0");
}

#[tokio::test]
async fn test_execute_pipeline_failure_marks_session_failed() {
    let h = harness().await;
    // A cyclic pipeline cannot compile.
    let pipeline = lambda_pipeline("P1", &[("A", &["B"]), ("B", &["A"])]);
    let mut session = started_session(&h, "S1").await;

    let err = h
        .services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "session");

    assert_eq!(session.status(), SessionStatus::Failed);
    assert_eq!(session.error_code(), Some("EXECUTION_START_FAILED"));
    let stored = h.services.sessions.get_session("S1").await.unwrap().unwrap();
    assert_eq!(stored.status(), SessionStatus::Failed);
    assert_eq!(stored.error_code(), Some("EXECUTION_START_FAILED"));
}

#[tokio::test]
async fn test_state_machine_reuse_update_and_suffix_fallback() {
    let h = harness().await;
    let executor = &h.services.executor;
    let pipeline = lambda_pipeline("P1", &[("A", &[]), ("B", &["A"])]);

    // Two executions of an identical revision reuse the same machine.
    let mut first = started_session(&h, "S1").await;
    executor.execute_pipeline(&pipeline, &mut first, None).await.unwrap();
    let mut second = h
        .services
        .session_manager
        .create_session(
            "P1",
            3,
            CreateSessionOptions {
                session_id: Some("S2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    executor.execute_pipeline(&pipeline, &mut second, None).await.unwrap();
    assert_eq!(first.state_machine_arn(), second.state_machine_arn());
    assert_eq!(h.scheduler.list_state_machines(None).await.unwrap().len(), 1);

    // A changed definition for the same revision updates in place.
    let mut changed = lambda_pipeline("P1", &[("A", &[]), ("B", &["A"])]);
    changed.set_timeout_seconds(7200);
    let mut third = h
        .services
        .session_manager
        .create_session(
            "P1",
            3,
            CreateSessionOptions {
                session_id: Some("S3".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    executor.execute_pipeline(&changed, &mut third, None).await.unwrap();
    assert_eq!(third.state_machine_arn(), first.state_machine_arn());
    assert_eq!(h.scheduler.list_state_machines(None).await.unwrap().len(), 1);
    let detail = h
        .scheduler
        .describe_state_machine(first.state_machine_arn().unwrap())
        .await
        .unwrap();
    assert!(detail.definition.contains("\"TimeoutSeconds\":7200"));

    // When the update is rejected, a suffixed machine is created instead.
    h.scheduler.set_fail_updates(true);
    let mut drifted = lambda_pipeline("P1", &[("A", &[]), ("B", &["A"])]);
    drifted.set_timeout_seconds(1800);
    let mut fourth = h
        .services
        .session_manager
        .create_session(
            "P1",
            3,
            CreateSessionOptions {
                session_id: Some("S4".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    executor.execute_pipeline(&drifted, &mut fourth, None).await.unwrap();
    assert_ne!(fourth.state_machine_arn(), first.state_machine_arn());

    let machines = h.scheduler.list_state_machines(None).await.unwrap();
    assert_eq!(machines.len(), 2);
    assert!(machines
        .iter()
        .any(|m| m.name.starts_with("bunsui-P1-1.0.0-v") && m.name != "bunsui-P1-1.0.0"));
}

#[tokio::test]
async fn test_polling_maps_status_and_counts_progress() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[]), ("B", &["A"]), ("C", &["B"])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();
    let execution_arn = session.execution_arn().unwrap().to_string();

    // Two jobs finished so far; one task failed and was retried (the
    // duplicate failure event must not double count).
    h.scheduler.record_state_exit(&execution_arn, "Job_A_End");
    h.scheduler.record_state_exit(&execution_arn, "Job_B_End");
    h.scheduler.record_task_failed(&execution_arn, "Operation_op_c");
    h.scheduler.record_task_failed(&execution_arn, "Operation_op_c");

    let status = h.services.executor.get_execution_status(&mut session).await.unwrap();
    assert_eq!(status, SessionStatus::Running);
    assert_eq!(session.completed_jobs(), 2);
    assert_eq!(session.failed_jobs(), 1);

    // Success completes the session and stamps completion.
    h.scheduler.record_state_exit(&execution_arn, "Job_C_End");
    h.scheduler
        .complete_execution(&execution_arn, ExecutionStatus::Succeeded, None);
    let status = h.services.executor.get_execution_status(&mut session).await.unwrap();
    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(session.completed_jobs(), 3);
    assert!(session.completed_at().is_some());
}

#[tokio::test]
async fn test_polling_maps_failures_and_timeouts() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);

    let mut failed = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut failed, None)
        .await
        .unwrap();
    h.scheduler.complete_execution(
        failed.execution_arn().unwrap(),
        ExecutionStatus::Failed,
        Some("Lambda returned an error"),
    );
    let status = h.services.executor.get_execution_status(&mut failed).await.unwrap();
    assert_eq!(status, SessionStatus::Failed);
    assert_eq!(failed.error_code(), Some("FAILED"));
    assert_eq!(failed.error_message(), Some("Lambda returned an error"));

    let mut timed_out = h
        .services
        .session_manager
        .create_session(
            "P1",
            1,
            CreateSessionOptions {
                session_id: Some("S2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut timed_out, None)
        .await
        .unwrap();
    h.scheduler
        .complete_execution(timed_out.execution_arn().unwrap(), ExecutionStatus::TimedOut, None);
    h.services.executor.get_execution_status(&mut timed_out).await.unwrap();
    assert_eq!(timed_out.status(), SessionStatus::Failed);
    assert_eq!(timed_out.error_code(), Some("TIMEOUT"));
}

#[tokio::test]
async fn test_get_execution_status_requires_arn() {
    let h = harness().await;
    let mut session = started_session(&h, "S1").await;
    let err = h
        .services
        .executor
        .get_execution_status(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "session");
}

#[tokio::test]
async fn test_stop_execution_cancels_session() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();

    h.services
        .executor
        .stop_execution(&mut session, Some("User requested stop"))
        .await
        .unwrap();

    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert_eq!(session.error_code(), Some("USER_CANCELLED"));
    assert!(session.completed_at().is_some());

    let description = h
        .scheduler
        .describe_execution(session.execution_arn().unwrap())
        .await
        .unwrap();
    assert_eq!(description.status, ExecutionStatus::Aborted);
}

#[tokio::test]
async fn test_retry_failed_execution_and_cap() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();
    h.scheduler
        .complete_execution(session.execution_arn().unwrap(), ExecutionStatus::Failed, Some("boom"));
    h.services.executor.get_execution_status(&mut session).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Failed);

    // Retry re-arms and restarts the execution.
    h.services
        .executor
        .retry_failed_execution(&pipeline, &mut session, None)
        .await
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Running);
    assert_eq!(session.retry_count(), 1);
    assert!(session.error_message().is_none());

    // Only failed sessions can be retried.
    let err = h
        .services
        .executor
        .retry_failed_execution(&pipeline, &mut session, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "session");

    // At the cap the retry is refused and the counter stays put.
    h.scheduler
        .complete_execution(session.execution_arn().unwrap(), ExecutionStatus::Failed, Some("boom"));
    h.services.executor.get_execution_status(&mut session).await.unwrap();
    while session.retry_count() < session.max_retries() {
        session.increment_retry();
    }
    assert_eq!(session.retry_count(), 3);
    let err = h
        .services
        .executor
        .retry_failed_execution(&pipeline, &mut session, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "session");
    assert!(err.to_string().contains("Maximum retry count exceeded"));
    assert_eq!(session.retry_count(), 3);
}

#[tokio::test]
async fn test_wait_for_completion_success() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();
    h.scheduler.record_state_exit(session.execution_arn().unwrap(), "Job_A_End");
    h.scheduler
        .complete_execution(session.execution_arn().unwrap(), ExecutionStatus::Succeeded, None);

    let status = h
        .services
        .executor
        .wait_for_completion(&mut session, Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_wait_for_completion_times_out_and_stops() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();

    // The execution never finishes; the poll loop must expire.
    let status = h
        .services
        .executor
        .wait_for_completion(&mut session, Duration::from_millis(50), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(status, SessionStatus::Timeout);
    assert_eq!(session.error_code(), Some("TIMEOUT"));

    let description = h
        .scheduler
        .describe_execution(session.execution_arn().unwrap())
        .await
        .unwrap();
    assert_eq!(description.status, ExecutionStatus::Aborted);
}

#[tokio::test]
async fn test_list_executions_for_pipeline_summary() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);

    // Unexecuted pipelines yield an empty listing.
    let listing = h
        .services
        .executor
        .list_executions_for_pipeline(&pipeline)
        .await
        .unwrap();
    assert_eq!(listing.total, 0);

    let mut first = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut first, None)
        .await
        .unwrap();
    h.scheduler
        .complete_execution(first.execution_arn().unwrap(), ExecutionStatus::Succeeded, None);

    let mut second = h
        .services
        .session_manager
        .create_session(
            "P1",
            1,
            CreateSessionOptions {
                session_id: Some("S2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut second, None)
        .await
        .unwrap();

    let listing = h
        .services
        .executor
        .list_executions_for_pipeline(&pipeline)
        .await
        .unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(listing.succeeded, 1);
    assert_eq!(listing.running, 1);
    assert_eq!(listing.failed, 0);
}

#[tokio::test]
async fn test_cancel_via_manager_stops_remote_execution() {
    let h = harness().await;
    let pipeline = lambda_pipeline("P1", &[("A", &[])]);
    let mut session = started_session(&h, "S1").await;
    h.services
        .executor
        .execute_pipeline(&pipeline, &mut session, None)
        .await
        .unwrap();
    let execution_arn = session.execution_arn().unwrap().to_string();

    let cancelled = h.services.session_manager.cancel_session("S1").await.unwrap();
    assert_eq!(cancelled.status(), SessionStatus::Cancelled);

    let description = h.scheduler.describe_execution(&execution_arn).await.unwrap();
    assert_eq!(description.status, ExecutionStatus::Aborted);
}
