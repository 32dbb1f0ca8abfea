//! Shared fixtures for the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use bunsui::infrastructure::adapters::{MemoryObjectStore, MemoryScheduler, MemoryTabularStore};
use bunsui::infrastructure::EngineConfig;
use bunsui::Services;
use bunsui_domain::entities::{Job, Operation, Pipeline};

/// In-memory service graph plus a typed handle to the scheduler so tests
/// can drive execution progress.
pub struct TestHarness {
    pub services: Services,
    pub scheduler: Arc<MemoryScheduler>,
}

pub async fn harness() -> TestHarness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = EngineConfig {
        execution_role_arn: "arn:aws:iam::123456789012:role/bunsui-exec".to_string(),
        ..EngineConfig::default()
    };
    let scheduler = Arc::new(MemoryScheduler::new(config.region.as_str()));
    let services = Services::new(
        config,
        scheduler.clone(),
        Arc::new(MemoryTabularStore::new()),
        Arc::new(MemoryObjectStore::new()),
    );
    services.initialize().await.expect("service initialization");
    TestHarness { services, scheduler }
}

/// Builds a pipeline of single-Lambda jobs. Each `(job_id, dependencies)`
/// pair becomes a job with one operation named `op_{job_id}`.
#[allow(dead_code)]
pub fn lambda_pipeline(pipeline_id: &str, jobs: &[(&str, &[&str])]) -> Pipeline {
    let mut pipeline = Pipeline::with_id(pipeline_id, format!("pipeline {}", pipeline_id)).unwrap();
    for (job_id, dependencies) in jobs {
        let mut job = Job::new(*job_id, format!("job {}", job_id)).unwrap();
        for dependency in *dependencies {
            job.add_dependency(*dependency);
        }
        job.add_operation(
            Operation::lambda(
                format!("op_{}", job_id),
                format!("op {}", job_id),
                format!("arn:aws:lambda:us-east-1:123456789012:function:{}", job_id),
            )
            .unwrap(),
        );
        pipeline.add_job(job).unwrap();
    }
    pipeline
}

/// A JSONL log record in the engine's wire format.
#[allow(dead_code)]
pub fn log_record(timestamp: &str, level: &str, message: &str, job_id: &str) -> serde_json::Value {
    serde_json::json!({
        "timestamp": timestamp,
        "level": level,
        "message": message,
        "logger": "bunsui.worker",
        "pid": 4242,
        "hostname": "worker-1",
        "context": {"job_id": job_id, "pipeline_id": "P1"},
    })
}

#[allow(dead_code)]
pub fn empty_options() -> bunsui::session::CreateSessionOptions {
    bunsui::session::CreateSessionOptions::default()
}

#[allow(dead_code)]
pub fn configuration(pairs: &[(&str, &str)]) -> HashMap<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect()
}
