// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Table Schema Catalog
//!
//! Schema descriptors for the three tabular-store tables, with their global
//! secondary indexes and the access patterns each index serves. Tables are
//! created on demand from these descriptors; names carry a deployment
//! prefix (`{prefix}-sessions`).
//!
//! | Table | Primary key | Indexes |
//! |---|---|---|
//! | sessions | `session_id` / `created_at` | by pipeline, by status, by user |
//! | job-history | `session_id` / `job_timestamp` | by pipeline, by status |
//! | pipelines | `pipeline_id` / `version` | by user |
//!
//! Change streams (new and old images) are enabled on sessions and
//! job-history. Every documented access pattern resolves to exactly one
//! primary-key or index lookup.

use std::collections::HashMap;

use crate::infrastructure::adapters::tabular::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, Projection, StreamSpecification, TableSchema,
};

/// Logical table names, combined with the deployment prefix at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Sessions,
    JobHistory,
    Pipelines,
}

impl TableName {
    pub fn as_str(self) -> &'static str {
        match self {
            TableName::Sessions => "sessions",
            TableName::JobHistory => "job-history",
            TableName::Pipelines => "pipelines",
        }
    }

    /// The physical table name under a deployment prefix.
    pub fn full_name(self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.as_str())
    }
}

/// Index names, one per secondary access pattern.
pub mod index {
    pub const SESSIONS_BY_PIPELINE: &str = "sessions-by-pipeline-index";
    pub const SESSIONS_BY_STATUS: &str = "sessions-by-status-index";
    pub const SESSIONS_BY_USER: &str = "sessions-by-user-index";
    pub const JOB_HISTORY_BY_PIPELINE: &str = "job-history-by-pipeline-index";
    pub const JOB_HISTORY_BY_STATUS: &str = "job-history-by-status-index";
    pub const PIPELINES_BY_USER: &str = "pipelines-by-user-index";
}

fn table_tags(component: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert("Application".to_string(), "bunsui".to_string());
    tags.insert("Component".to_string(), component.to_string());
    tags.insert("Environment".to_string(), "production".to_string());
    tags
}

fn streams_enabled() -> Option<StreamSpecification> {
    Some(StreamSpecification {
        enabled: true,
        view_type: "NEW_AND_OLD_IMAGES".to_string(),
    })
}

/// Schema of the sessions table: session records with embedded checkpoints.
pub fn sessions_table_schema(prefix: &str) -> TableSchema {
    TableSchema {
        table_name: TableName::Sessions.full_name(prefix),
        attribute_definitions: vec![
            AttributeDefinition::string("session_id"),
            AttributeDefinition::string("created_at"),
            AttributeDefinition::string("pipeline_id"),
            AttributeDefinition::string("status"),
            AttributeDefinition::string("user_id"),
        ],
        key_schema: vec![
            KeySchemaElement::hash("session_id"),
            KeySchemaElement::range("created_at"),
        ],
        global_secondary_indexes: vec![
            GlobalSecondaryIndex {
                index_name: index::SESSIONS_BY_PIPELINE.to_string(),
                key_schema: vec![
                    KeySchemaElement::hash("pipeline_id"),
                    KeySchemaElement::range("created_at"),
                ],
                projection: Projection::All,
            },
            GlobalSecondaryIndex {
                index_name: index::SESSIONS_BY_STATUS.to_string(),
                key_schema: vec![KeySchemaElement::hash("status"), KeySchemaElement::range("created_at")],
                projection: Projection::All,
            },
            GlobalSecondaryIndex {
                index_name: index::SESSIONS_BY_USER.to_string(),
                key_schema: vec![KeySchemaElement::hash("user_id"), KeySchemaElement::range("created_at")],
                projection: Projection::All,
            },
        ],
        billing_mode: "PAY_PER_REQUEST".to_string(),
        stream_specification: streams_enabled(),
        tags: table_tags("sessions"),
    }
}

/// Schema of the job-history table: one row per job execution attempt,
/// range-keyed by `{job_id}#{started_at}`.
pub fn job_history_table_schema(prefix: &str) -> TableSchema {
    TableSchema {
        table_name: TableName::JobHistory.full_name(prefix),
        attribute_definitions: vec![
            AttributeDefinition::string("session_id"),
            AttributeDefinition::string("job_timestamp"),
            AttributeDefinition::string("pipeline_id"),
            AttributeDefinition::string("job_status"),
        ],
        key_schema: vec![
            KeySchemaElement::hash("session_id"),
            KeySchemaElement::range("job_timestamp"),
        ],
        global_secondary_indexes: vec![
            GlobalSecondaryIndex {
                index_name: index::JOB_HISTORY_BY_PIPELINE.to_string(),
                key_schema: vec![
                    KeySchemaElement::hash("pipeline_id"),
                    KeySchemaElement::range("job_timestamp"),
                ],
                projection: Projection::All,
            },
            GlobalSecondaryIndex {
                index_name: index::JOB_HISTORY_BY_STATUS.to_string(),
                key_schema: vec![
                    KeySchemaElement::hash("job_status"),
                    KeySchemaElement::range("job_timestamp"),
                ],
                projection: Projection::Include(vec![
                    "session_id".to_string(),
                    "job_id".to_string(),
                    "pipeline_id".to_string(),
                    "started_at".to_string(),
                    "completed_at".to_string(),
                    "error_message".to_string(),
                ]),
            },
        ],
        billing_mode: "PAY_PER_REQUEST".to_string(),
        stream_specification: streams_enabled(),
        tags: table_tags("job-history"),
    }
}

/// Schema of the pipelines table: one row per `(pipeline_id, version)`.
pub fn pipelines_table_schema(prefix: &str) -> TableSchema {
    TableSchema {
        table_name: TableName::Pipelines.full_name(prefix),
        attribute_definitions: vec![
            AttributeDefinition::string("pipeline_id"),
            AttributeDefinition::string("version"),
            AttributeDefinition::string("user_id"),
            AttributeDefinition::string("created_at"),
        ],
        key_schema: vec![
            KeySchemaElement::hash("pipeline_id"),
            KeySchemaElement::range("version"),
        ],
        global_secondary_indexes: vec![GlobalSecondaryIndex {
            index_name: index::PIPELINES_BY_USER.to_string(),
            key_schema: vec![KeySchemaElement::hash("user_id"), KeySchemaElement::range("created_at")],
            projection: Projection::All,
        }],
        billing_mode: "PAY_PER_REQUEST".to_string(),
        stream_specification: None,
        tags: table_tags("pipelines"),
    }
}

/// All table schemas for a deployment prefix.
pub fn all_table_schemas(prefix: &str) -> Vec<TableSchema> {
    vec![
        sessions_table_schema(prefix),
        job_history_table_schema(prefix),
        pipelines_table_schema(prefix),
    ]
}
