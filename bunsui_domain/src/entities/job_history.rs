// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job History Record
//!
//! One row per job execution attempt, keyed by `(session_id, job_timestamp)`
//! where `job_timestamp` is `"{job_id}#{started_at RFC3339}"`. The composite
//! sort key keeps a session's attempts grouped by job and ordered by start
//! time with a single range query.

use serde::{Deserialize, Serialize};

use crate::entities::{Job, JobStatus};
use crate::services::datetime_serde;
use crate::BunsuiError;

/// A persisted job execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistoryRecord {
    pub session_id: String,
    /// Range key: `{job_id}#{started_at RFC3339}`.
    pub job_timestamp: String,
    pub job_id: String,
    pub pipeline_id: String,
    pub job_name: String,
    pub job_status: JobStatus,
    #[serde(with = "datetime_serde")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde::optional")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: u32,
}

impl JobHistoryRecord {
    /// Builds the composite range key for a job attempt.
    pub fn timestamp_key(job_id: &str, started_at: &chrono::DateTime<chrono::Utc>) -> String {
        format!("{}#{}", job_id, started_at.to_rfc3339())
    }

    /// Captures the current attempt of `job` as a history record.
    ///
    /// # Errors
    ///
    /// * `Validation` - if the job has not started yet (`started_at` unset)
    pub fn from_job(session_id: &str, pipeline_id: &str, job: &Job) -> Result<Self, BunsuiError> {
        let started_at = *job.started_at().ok_or_else(|| {
            BunsuiError::validation(format!(
                "Job {} has no start time; history records cover started attempts only",
                job.job_id()
            ))
        })?;

        Ok(Self {
            session_id: session_id.to_string(),
            job_timestamp: Self::timestamp_key(job.job_id(), &started_at),
            job_id: job.job_id().to_string(),
            pipeline_id: pipeline_id.to_string(),
            job_name: job.name().to_string(),
            job_status: job.status(),
            started_at,
            completed_at: job.completed_at().copied(),
            error_message: job.error_message().map(String::from),
            error_code: job.error_code().map(String::from),
            retry_count: job.retry_count(),
        })
    }
}
