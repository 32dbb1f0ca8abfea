//! # End-to-End Orchestration Test
//!
//! Drives the full engine over the in-memory adapters: register a
//! pipeline, persist its config, create and execute a session, feed
//! scheduler progress, poll to completion, record job history, aggregate
//! logs, and clean up the session's artifacts.

mod common;

use std::time::Duration;

use anyhow::Result;

use bunsui::infrastructure::adapters::object_store::ObjectStoreAdapter;
use bunsui::infrastructure::adapters::scheduler::ExecutionStatus;
use bunsui::logs::{LogFilter, LogLevel};
use bunsui::session::CreateSessionOptions;
use bunsui_domain::entities::{JobHistoryRecord, JobStatus, SessionStatus};

use common::{harness, lambda_pipeline, log_record};

#[tokio::test]
async fn test_full_pipeline_run() -> Result<()> {
    let h = harness().await;
    let services = &h.services;

    // Register the pipeline and its object-store config copy.
    let pipeline = lambda_pipeline("P1", &[("extract", &[]), ("transform", &["extract"]), ("load", &["transform"])]);
    services.pipelines.create_pipeline(&pipeline).await?;
    let config_key = services.storage.store_pipeline_config(&pipeline).await?;
    assert_eq!(config_key, "configs/pipelines/P1/1.0.0.json");

    // The DAG resolves in declaration order.
    assert_eq!(pipeline.execution_order()?, vec!["extract", "transform", "load"]);

    // Create and execute a session for it.
    let session = services
        .session_manager
        .create_session(
            "P1",
            3,
            CreateSessionOptions {
                session_id: Some("S1".to_string()),
                user_id: Some("u-1".to_string()),
                ..Default::default()
            },
        )
        .await?;
    let mut session = session;
    services.executor.execute_pipeline(&pipeline, &mut session, None).await?;
    assert_eq!(session.status(), SessionStatus::Running);

    let execution_arn = session.execution_arn().unwrap().to_string();

    // The scheduler works through the jobs; operations write logs.
    for (index, job_id) in ["extract", "transform", "load"].iter().enumerate() {
        h.scheduler.record_state_exit(&execution_arn, &format!("Job_{}_End", job_id));
        services
            .storage
            .store_log_entry(
                "S1",
                job_id,
                &format!("op_{}", job_id),
                &log_record(
                    &format!("2024-01-15T10:0{}:00Z", index),
                    "INFO",
                    &format!("{} finished", job_id),
                    job_id,
                ),
            )
            .await?;
    }
    h.scheduler
        .complete_execution(&execution_arn, ExecutionStatus::Succeeded, None);

    // Poll to completion.
    let status = services
        .executor
        .wait_for_completion(&mut session, Duration::from_secs(5), Duration::from_millis(10))
        .await?;
    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(session.completed_jobs(), 3);
    assert!(session.completed_at().is_some());

    // Job history mirrors the attempts.
    let mut finished = pipeline.clone();
    for job_id in ["extract", "transform", "load"] {
        let job = finished.get_job_mut(job_id).unwrap();
        job.transition_to(JobStatus::Running).unwrap();
        job.transition_to(JobStatus::Completed).unwrap();
        let record = JobHistoryRecord::from_job("S1", "P1", job).unwrap();
        services.job_history.record_attempt(&record).await?;
    }
    let history = services.job_history.get_job_history_for_session("S1").await?;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.job_status == JobStatus::Completed));
    assert_eq!(finished.job_stats().completion_percentage, 100.0);

    // Log aggregation sees every operation's entries, in time order.
    let entries = services
        .log_service
        .get_session_logs("S1", &LogFilter::default(), None)
        .await?;
    assert_eq!(entries.len(), 3);
    assert!(entries.windows(2).all(|p| p[0].timestamp <= p[1].timestamp));

    let summary = services.log_service.get_log_summary("S1").await?;
    assert_eq!(summary.levels.get(&LogLevel::Info), Some(&3));
    assert_eq!(summary.jobs.len(), 3);

    // Reports and cleanup.
    services.storage.store_report("S1", "<html>done</html>").await?;
    assert_eq!(services.storage.list_session_reports("S1").await?.len(), 1);
    let removed = services.storage.delete_session_data("S1").await?;
    assert_eq!(removed, 4);
    assert!(services.storage.list_session_logs("S1", None).await?.is_empty());

    // The stored pipeline config still round-trips.
    let stored = services.storage.get_pipeline_config("P1", "1.0.0").await?.unwrap();
    assert_eq!(stored, pipeline);

    Ok(())
}

#[tokio::test]
async fn test_pipeline_revision_flow() -> Result<()> {
    let h = harness().await;
    let services = &h.services;

    let pipeline = lambda_pipeline("P1", &[("extract", &[])]);
    services.pipelines.create_pipeline(&pipeline).await?;

    // Each update writes a new revision; both stay addressable.
    let revised = services.pipelines.update_pipeline(&pipeline).await?;
    assert_eq!(revised.version().as_str(), "1.0.1");
    assert!(services.pipelines.get_pipeline("P1", Some("1.0.0")).await?.is_some());
    assert!(services.pipelines.get_pipeline("P1", Some("1.0.1")).await?.is_some());

    // Different revisions register different state machines.
    let mut session = services
        .session_manager
        .create_session("P1", 1, CreateSessionOptions::default())
        .await?;
    services.executor.execute_pipeline(&pipeline, &mut session, None).await?;
    let mut session2 = services
        .session_manager
        .create_session("P1", 1, CreateSessionOptions::default())
        .await?;
    services.executor.execute_pipeline(&revised, &mut session2, None).await?;
    assert_ne!(session.state_machine_arn(), session2.state_machine_arn());

    // Deleting without a version removes every revision.
    assert!(services.pipelines.delete_pipeline("P1", None).await?);
    assert!(services.pipelines.get_pipeline("P1", None).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_object_store_file_helpers_and_presigned_urls() -> Result<()> {
    let h = harness().await;
    let store = &h.services.object_store;
    let bucket = h.services.storage.bucket();

    // Round-trip a local file through the store.
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("report.html");
    tokio::fs::write(&source, b"<html>report</html>").await?;
    store.upload_file(bucket, "reports/manual/report.html", &source).await?;

    let target = dir.path().join("downloaded.html");
    store
        .download_file(bucket, "reports/manual/report.html", &target)
        .await?;
    assert_eq!(tokio::fs::read(&target).await?, b"<html>report</html>");

    // Downloading a missing key is ResourceNotFound.
    let err = store
        .download_file(bucket, "reports/manual/missing.html", &target)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "resource_not_found");

    // Presigned URLs carry method and expiry.
    let url = h
        .services
        .storage
        .report_url("S1", Duration::from_secs(1800))
        .await?;
    assert!(url.contains("expires_in=1800"));

    Ok(())
}
