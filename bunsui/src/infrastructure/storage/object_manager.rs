// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Storage Manager
//!
//! Owns the three-tier key scheme of the object store and the operations
//! over it:
//!
//! - `logs/{yyyy}/{mm}/{dd}/{session_id}/{job_id}/{operation_id}.jsonl`
//! - `reports/{yyyy}/{mm}/{dd}/{session_id}.html`
//! - `configs/pipelines/{pipeline_id}/{version}.json`
//!
//! Log shards are line-delimited JSON; appending re-writes the shard with
//! the new line attached, which keeps the store contract down to plain puts.
//! Deleting a session's data removes its log and report objects by prefix
//! walk.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use bunsui_domain::entities::Pipeline;
use bunsui_domain::BunsuiError;

use crate::infrastructure::adapters::object_store::{ObjectMetadata, ObjectStoreAdapter};

/// Manager for session logs, reports, and pipeline configs in the object
/// store.
pub struct ObjectStorageManager {
    store: Arc<dyn ObjectStoreAdapter>,
    bucket: String,
}

impl ObjectStorageManager {
    pub fn new(store: Arc<dyn ObjectStoreAdapter>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Creates the backing bucket if it does not exist yet.
    pub async fn initialize(&self, region: Option<&str>) -> Result<(), BunsuiError> {
        self.store.create_bucket(&self.bucket, region).await
    }

    /// Log shard key for an operation on a given date.
    pub fn log_path_at(date: &DateTime<Utc>, session_id: &str, job_id: &str, operation_id: &str) -> String {
        format!(
            "logs/{}/{:02}/{:02}/{}/{}/{}.jsonl",
            date.year(),
            date.month(),
            date.day(),
            session_id,
            job_id,
            operation_id
        )
    }

    /// Report key for a session on a given date.
    pub fn report_path_at(date: &DateTime<Utc>, session_id: &str) -> String {
        format!(
            "reports/{}/{:02}/{:02}/{}.html",
            date.year(),
            date.month(),
            date.day(),
            session_id
        )
    }

    /// Config key for a pipeline revision.
    pub fn config_path(pipeline_id: &str, version: &str) -> String {
        format!("configs/pipelines/{}/{}.json", pipeline_id, version)
    }

    /// Appends one JSON log record to the operation's shard for today.
    /// Returns the shard key.
    pub async fn store_log_entry(
        &self,
        session_id: &str,
        job_id: &str,
        operation_id: &str,
        record: &Value,
    ) -> Result<String, BunsuiError> {
        let key = Self::log_path_at(&Utc::now(), session_id, job_id, operation_id);
        let line = serde_json::to_string(record)?;

        let mut body = self.store.get_object(&self.bucket, &key).await?.unwrap_or_default();
        if !body.is_empty() && !body.ends_with(b"\n") {
            body.push(b'\n');
        }
        body.extend_from_slice(line.as_bytes());
        body.push(b'\n');

        self.store
            .put_object(&self.bucket, &key, body, Some("application/x-ndjson"), &HashMap::new())
            .await?;
        Ok(key)
    }

    /// Stores a session's final report for today. Returns the report key.
    pub async fn store_report(&self, session_id: &str, html: &str) -> Result<String, BunsuiError> {
        let key = Self::report_path_at(&Utc::now(), session_id);
        self.store
            .put_object(
                &self.bucket,
                &key,
                html.as_bytes().to_vec(),
                Some("text/html"),
                &HashMap::new(),
            )
            .await?;
        Ok(key)
    }

    /// Stores a serialized pipeline revision. Returns the config key.
    pub async fn store_pipeline_config(&self, pipeline: &Pipeline) -> Result<String, BunsuiError> {
        let key = Self::config_path(pipeline.pipeline_id(), pipeline.version().as_str());
        let body = serde_json::to_vec(pipeline)?;
        self.store
            .put_object(&self.bucket, &key, body, Some("application/json"), &HashMap::new())
            .await?;
        debug!(%key, "pipeline config stored");
        Ok(key)
    }

    /// Loads a stored pipeline revision, if present.
    pub async fn get_pipeline_config(
        &self,
        pipeline_id: &str,
        version: &str,
    ) -> Result<Option<Pipeline>, BunsuiError> {
        let key = Self::config_path(pipeline_id, version);
        match self.store.get_object(&self.bucket, &key).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }

    /// Lists the config keys stored for a pipeline.
    pub async fn list_pipeline_configs(&self, pipeline_id: &str) -> Result<Vec<ObjectMetadata>, BunsuiError> {
        let prefix = format!("configs/pipelines/{}/", pipeline_id);
        self.store.list_objects(&self.bucket, Some(&prefix), None).await
    }

    /// Lists a session's log shards across all dates, optionally narrowed
    /// to one job. The date tiers sit above the session segment, so the
    /// listing walks the `logs/` prefix and filters on path segments.
    pub async fn list_session_logs(
        &self,
        session_id: &str,
        job_id: Option<&str>,
    ) -> Result<Vec<ObjectMetadata>, BunsuiError> {
        let objects = self.store.list_objects(&self.bucket, Some("logs/"), None).await?;
        Ok(objects
            .into_iter()
            .filter(|object| {
                let segments: Vec<&str> = object.key.split('/').collect();
                segments.get(4) == Some(&session_id)
                    && job_id.is_none_or(|job| segments.get(5) == Some(&job))
            })
            .collect())
    }

    /// Lists a session's reports across all dates.
    pub async fn list_session_reports(&self, session_id: &str) -> Result<Vec<ObjectMetadata>, BunsuiError> {
        let file_name = format!("{}.html", session_id);
        let objects = self.store.list_objects(&self.bucket, Some("reports/"), None).await?;
        Ok(objects
            .into_iter()
            .filter(|object| object.key.rsplit('/').next() == Some(file_name.as_str()))
            .collect())
    }

    /// Fetches one log shard's raw content.
    pub async fn get_log_object(&self, key: &str) -> Result<Option<Vec<u8>>, BunsuiError> {
        self.store.get_object(&self.bucket, key).await
    }

    /// Deletes a session's logs and reports. Returns how many objects were
    /// removed.
    pub async fn delete_session_data(&self, session_id: &str) -> Result<usize, BunsuiError> {
        let mut keys: Vec<String> = self
            .list_session_logs(session_id, None)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.extend(self.list_session_reports(session_id).await?.into_iter().map(|o| o.key));

        let mut removed = 0;
        for key in keys {
            if self.store.delete_object(&self.bucket, &key).await? {
                removed += 1;
            }
        }
        debug!(session_id, removed, "session data deleted");
        Ok(removed)
    }

    /// Presigned download URL for a log shard.
    pub async fn log_url(
        &self,
        session_id: &str,
        job_id: &str,
        operation_id: &str,
        expires_in: Duration,
    ) -> Result<String, BunsuiError> {
        let key = Self::log_path_at(&Utc::now(), session_id, job_id, operation_id);
        self.store.presigned_get_url(&self.bucket, &key, expires_in).await
    }

    /// Presigned download URL for a session's report.
    pub async fn report_url(&self, session_id: &str, expires_in: Duration) -> Result<String, BunsuiError> {
        let key = Self::report_path_at(&Utc::now(), session_id);
        self.store.presigned_get_url(&self.bucket, &key, expires_in).await
    }
}
