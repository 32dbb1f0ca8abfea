// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Repository
//!
//! Tabular-store persistence for pipeline definitions, keyed by
//! `(pipeline_id, version)`. Revisions are immutable: `update_pipeline`
//! bumps the version's patch segment and writes a new row instead of
//! mutating the stored one. Deleting without a version removes every
//! revision of the pipeline.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use bunsui_domain::entities::Pipeline;
use bunsui_domain::BunsuiError;

use crate::infrastructure::adapters::tabular::{Item, PutCondition, QueryRequest, TabularStoreAdapter};
use crate::infrastructure::repositories::schema::{index, pipelines_table_schema};

/// Repository for versioned pipeline definitions.
pub struct PipelineRepository {
    store: Arc<dyn TabularStoreAdapter>,
    table_name: String,
    table_prefix: String,
}

impl PipelineRepository {
    pub fn new(store: Arc<dyn TabularStoreAdapter>, table_prefix: impl Into<String>) -> Self {
        let table_prefix = table_prefix.into();
        Self {
            table_name: pipelines_table_schema(&table_prefix).table_name,
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
            .create_table(&pipelines_table_schema(&self.table_prefix))
            .await
    }

    /// Persists a new pipeline revision after validating the definition.
    ///
    /// # Errors
    ///
    /// * `Validation` - invalid definition, or the `(id, version)` row
    ///   already exists
    pub async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<(), BunsuiError> {
        pipeline.validate()?;
        let item = pipeline_to_item(pipeline)?;
        self.store
            .put_item(&self.table_name, item, PutCondition::MustNotExist)
            .await?;
        debug!(
            pipeline_id = pipeline.pipeline_id(),
            version = %pipeline.version(),
            "pipeline revision created"
        );
        Ok(())
    }

    /// Loads a pipeline revision; with no version, the latest revision by
    /// range-key order.
    pub async fn get_pipeline(
        &self,
        pipeline_id: &str,
        version: Option<&str>,
    ) -> Result<Option<Pipeline>, BunsuiError> {
        match version {
            Some(version) => {
                let mut key = Item::new();
                key.insert("pipeline_id".to_string(), Value::from(pipeline_id));
                key.insert("version".to_string(), Value::from(version));
                self.store
                    .get_item(&self.table_name, &key)
                    .await?
                    .map(item_to_pipeline)
                    .transpose()
            }
            None => {
                let request = QueryRequest::new(&self.table_name)
                    .key_eq("pipeline_id", pipeline_id)
                    .descending()
                    .limit(1);
                let mut items = self.store.query(&request).await?;
                items.pop().map(item_to_pipeline).transpose()
            }
        }
    }

    /// Writes the next revision of a pipeline: bumps the patch segment of
    /// the version and stores a new row. Returns the stored revision.
    pub async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<Pipeline, BunsuiError> {
        pipeline.validate()?;
        let mut next = pipeline.clone();
        next.set_version(pipeline.version().bumped());
        let item = pipeline_to_item(&next)?;
        self.store
            .put_item(&self.table_name, item, PutCondition::MustNotExist)
            .await?;
        debug!(
            pipeline_id = next.pipeline_id(),
            version = %next.version(),
            "pipeline revision bumped"
        );
        Ok(next)
    }

    /// Deletes one revision, or every revision when `version` is `None`.
    /// Returns whether anything was removed.
    pub async fn delete_pipeline(&self, pipeline_id: &str, version: Option<&str>) -> Result<bool, BunsuiError> {
        let versions: Vec<String> = match version {
            Some(version) => vec![version.to_string()],
            None => self.get_pipeline_versions(pipeline_id).await?,
        };

        let mut removed = false;
        for version in versions {
            let mut key = Item::new();
            key.insert("pipeline_id".to_string(), Value::from(pipeline_id));
            key.insert("version".to_string(), Value::from(version));
            removed |= self.store.delete_item(&self.table_name, &key).await?;
        }
        Ok(removed)
    }

    /// Lists a user's pipelines, newest first.
    pub async fn list_pipelines_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Pipeline>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name)
            .key_eq("user_id", user_id)
            .on_index(index::PIPELINES_BY_USER)
            .descending()
            .limit(limit);
        let items = self.store.query(&request).await?;
        items.into_iter().map(item_to_pipeline).collect()
    }

    /// All stored versions of a pipeline, in range-key order.
    pub async fn get_pipeline_versions(&self, pipeline_id: &str) -> Result<Vec<String>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name).key_eq("pipeline_id", pipeline_id);
        let items = self.store.query(&request).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.get("version").and_then(Value::as_str).map(String::from))
            .collect())
    }
}

fn pipeline_to_item(pipeline: &Pipeline) -> Result<Item, BunsuiError> {
    match serde_json::to_value(pipeline)? {
        Value::Object(map) => Ok(map),
        other => Err(BunsuiError::serialization(format!(
            "Pipeline serialized to a non-object value: {}",
            other
        ))),
    }
}

fn item_to_pipeline(item: Item) -> Result<Pipeline, BunsuiError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::memory::MemoryTabularStore;
    use bunsui_domain::entities::{Job, Operation};

    async fn repository() -> PipelineRepository {
        let repository = PipelineRepository::new(Arc::new(MemoryTabularStore::new()), "test");
        repository.initialize().await.unwrap();
        repository
    }

    fn pipeline(id: &str) -> Pipeline {
        let mut p = Pipeline::with_id(id, format!("pipeline {}", id)).unwrap();
        let mut job = Job::new("a", "job a").unwrap();
        job.add_operation(Operation::lambda("op-a", "a", "arn:aws:lambda:us-east-1:1:function:a").unwrap());
        p.add_job(job).unwrap();
        p.set_user(Some("u-1".to_string()), Some("dana".to_string()));
        p
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let repository = repository().await;
        let p = pipeline("p-1");
        repository.create_pipeline(&p).await.unwrap();

        let loaded = repository.get_pipeline("p-1", Some("1.0.0")).await.unwrap().unwrap();
        assert_eq!(loaded, p);
        assert!(repository.get_pipeline("p-1", Some("9.9.9")).await.unwrap().is_none());
        assert!(repository.get_pipeline("missing", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_revision() {
        let repository = repository().await;
        let p = pipeline("p-1");
        repository.create_pipeline(&p).await.unwrap();
        let err = repository.create_pipeline(&p).await.unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let repository = repository().await;
        let mut p = pipeline("p-1");
        let mut dangling = Job::new("b", "job b").unwrap();
        dangling.add_dependency("ghost");
        p.add_job(dangling).unwrap();
        assert!(repository.create_pipeline(&p).await.is_err());
    }

    #[tokio::test]
    async fn test_update_bumps_patch_segment() {
        let repository = repository().await;
        let p = pipeline("p-1");
        repository.create_pipeline(&p).await.unwrap();

        let next = repository.update_pipeline(&p).await.unwrap();
        assert_eq!(next.version().as_str(), "1.0.1");

        let versions = repository.get_pipeline_versions("p-1").await.unwrap();
        assert_eq!(versions, vec!["1.0.0", "1.0.1"]);

        // Latest revision wins when no version is requested.
        let latest = repository.get_pipeline("p-1", None).await.unwrap().unwrap();
        assert_eq!(latest.version().as_str(), "1.0.1");
    }

    #[tokio::test]
    async fn test_delete_without_version_removes_all_revisions() {
        let repository = repository().await;
        let p = pipeline("p-1");
        repository.create_pipeline(&p).await.unwrap();
        repository.update_pipeline(&p).await.unwrap();

        assert!(repository.delete_pipeline("p-1", None).await.unwrap());
        assert!(repository.get_pipeline_versions("p-1").await.unwrap().is_empty());
        assert!(!repository.delete_pipeline("p-1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let repository = repository().await;
        repository.create_pipeline(&pipeline("p-1")).await.unwrap();
        repository.create_pipeline(&pipeline("p-2")).await.unwrap();
        let mut other = pipeline("p-3");
        other.set_user(Some("u-2".to_string()), None);
        repository.create_pipeline(&other).await.unwrap();

        let mine = repository.list_pipelines_by_user("u-1", 10).await.unwrap();
        assert_eq!(mine.len(), 2);
        let theirs = repository.list_pipelines_by_user("u-2", 10).await.unwrap();
        assert_eq!(theirs.len(), 1);
    }
}
