// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Store Adapter Contract
//!
//! The object store is a remote blob store accessed by key prefix. It backs
//! the append-only and large artifacts: operation log shards, session
//! reports, and serialized pipeline configs (see
//! [`crate::infrastructure::storage`] for the path scheme).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use bunsui_domain::BunsuiError;

/// Listing entry for a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// Contract for the blob store.
///
/// Keys are `/`-separated paths; listings are prefix-based and returned in
/// ascending key order.
#[async_trait]
pub trait ObjectStoreAdapter: Send + Sync {
    /// Creates a bucket. Outside the default region the implementation sets
    /// the appropriate location constraint.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<(), BunsuiError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BunsuiError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BunsuiError>;

    /// Stores an object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> Result<(), BunsuiError>;

    /// Fetches an object's bytes, or `None` when the key does not exist.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BunsuiError>;

    /// Deletes an object. Returns whether one was removed.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, BunsuiError>;

    /// Lists objects under a prefix, ascending by key.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<Vec<ObjectMetadata>, BunsuiError>;

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), BunsuiError>;

    /// Generates a time-limited URL for downloading an object.
    async fn presigned_get_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, BunsuiError>;

    /// Generates a time-limited URL for uploading an object.
    async fn presigned_put_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, BunsuiError>;

    /// Uploads a local file as an object.
    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), BunsuiError> {
        let body = tokio::fs::read(path).await?;
        self.put_object(bucket, key, body, None, &HashMap::new()).await
    }

    /// Downloads an object to a local file.
    ///
    /// # Errors
    ///
    /// * `ResourceNotFound` - the key does not exist
    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), BunsuiError> {
        let body = self
            .get_object(bucket, key)
            .await?
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Object not found: {}/{}", bucket, key)))?;
        tokio::fs::write(path, body).await?;
        Ok(())
    }
}
