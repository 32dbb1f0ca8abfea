// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job History Repository
//!
//! One row per job execution attempt, range-keyed by
//! `{job_id}#{started_at}` so a session's attempts come back grouped by job
//! and ordered by start time from a single range query. Failed attempts are
//! reachable across all sessions through the status index.

use serde_json::Value;
use std::sync::Arc;

use bunsui_domain::entities::JobHistoryRecord;
use bunsui_domain::BunsuiError;

use crate::infrastructure::adapters::tabular::{Item, PutCondition, QueryRequest, TabularStoreAdapter};
use crate::infrastructure::repositories::schema::{index, job_history_table_schema};

/// Repository for job execution attempts.
pub struct JobHistoryRepository {
    store: Arc<dyn TabularStoreAdapter>,
    table_name: String,
    table_prefix: String,
}

impl JobHistoryRepository {
    pub fn new(store: Arc<dyn TabularStoreAdapter>, table_prefix: impl Into<String>) -> Self {
        let table_prefix = table_prefix.into();
        Self {
            table_name: job_history_table_schema(&table_prefix).table_name,
            store,
            table_prefix,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Creates the backing table if it does not exist yet.
    pub async fn initialize(&self) -> Result<(), BunsuiError> {
        self.store
            .create_table(&job_history_table_schema(&self.table_prefix))
            .await
    }

    /// Records (or re-records) a job attempt. The same attempt, identified
    /// by its `(session_id, job_timestamp)` key, is overwritten in place as
    /// its status progresses.
    pub async fn record_attempt(&self, record: &JobHistoryRecord) -> Result<(), BunsuiError> {
        let item = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            other => {
                return Err(BunsuiError::serialization(format!(
                    "Job history record serialized to a non-object value: {}",
                    other
                )))
            }
        };
        self.store.put_item(&self.table_name, item, PutCondition::None).await
    }

    /// All attempts recorded for a session, in range-key order.
    pub async fn get_job_history_for_session(&self, session_id: &str) -> Result<Vec<JobHistoryRecord>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name).key_eq("session_id", session_id);
        let items = self.store.query(&request).await?;
        items.into_iter().map(item_to_record).collect()
    }

    /// Attempts across all sessions of a pipeline, newest first.
    pub async fn get_job_history_by_pipeline(
        &self,
        pipeline_id: &str,
        limit: usize,
    ) -> Result<Vec<JobHistoryRecord>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name)
            .key_eq("pipeline_id", pipeline_id)
            .on_index(index::JOB_HISTORY_BY_PIPELINE)
            .descending()
            .limit(limit);
        let items = self.store.query(&request).await?;
        items.into_iter().map(item_to_record).collect()
    }

    /// Failed attempts across all sessions, newest first.
    pub async fn list_failed_jobs(&self, limit: usize) -> Result<Vec<JobHistoryRecord>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name)
            .key_eq("job_status", "failed")
            .on_index(index::JOB_HISTORY_BY_STATUS)
            .descending()
            .limit(limit);
        let items = self.store.query(&request).await?;
        items.into_iter().map(item_to_record).collect()
    }
}

fn item_to_record(item: Item) -> Result<JobHistoryRecord, BunsuiError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}
