// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Repository
//!
//! Tabular-store persistence for sessions, including their embedded
//! checkpoint lists. Creates are fenced on key absence and updates on key
//! presence; across processes, those conditional puts serialize concurrent
//! mutations of the same session.
//!
//! Access patterns (each one primary-key or index lookup):
//! `get_session`, `list_sessions_by_{pipeline,status,user}` newest-first,
//! plus a `list_sessions` dispatcher over the optional filters.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use bunsui_domain::entities::{Checkpoint, Session, SessionStatus};
use bunsui_domain::BunsuiError;

use crate::infrastructure::adapters::tabular::{Item, PutCondition, QueryRequest, TabularStoreAdapter};
use crate::infrastructure::repositories::schema::{index, sessions_table_schema};

/// Repository for session records.
pub struct SessionRepository {
    store: Arc<dyn TabularStoreAdapter>,
    table_name: String,
    table_prefix: String,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn TabularStoreAdapter>, table_prefix: impl Into<String>) -> Self {
        let table_prefix = table_prefix.into();
        Self {
            table_name: sessions_table_schema(&table_prefix).table_name,
            store,
            table_prefix,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Creates the backing table if it does not exist yet.
    pub async fn initialize(&self) -> Result<(), BunsuiError> {
        self.store.create_table(&sessions_table_schema(&self.table_prefix)).await
    }

    /// Persists a new session. Fails if the session id is already taken.
    ///
    /// # Errors
    ///
    /// * `Validation` - a session with the same key already exists
    pub async fn create_session(&self, session: &Session) -> Result<(), BunsuiError> {
        let item = session_to_item(session)?;
        self.store
            .put_item(&self.table_name, item, PutCondition::MustNotExist)
            .await?;
        debug!(session_id = session.session_id(), "session created");
        Ok(())
    }

    /// Persists an updated session. Fails if it was never created.
    pub async fn update_session(&self, session: &Session) -> Result<(), BunsuiError> {
        let item = session_to_item(session)?;
        self.store
            .put_item(&self.table_name, item, PutCondition::MustExist)
            .await?;
        debug!(
            session_id = session.session_id(),
            status = %session.status(),
            "session updated"
        );
        Ok(())
    }

    /// Loads a session by id.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name).key_eq("session_id", session_id).limit(1);
        let mut items = self.store.query(&request).await?;
        items.pop().map(item_to_session).transpose()
    }

    /// Deletes a session's rows. Returns whether anything was removed.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, BunsuiError> {
        let request = QueryRequest::new(&self.table_name).key_eq("session_id", session_id);
        let items = self.store.query(&request).await?;
        let mut removed = false;
        for item in items {
            let mut key = Item::new();
            for attribute in ["session_id", "created_at"] {
                if let Some(value) = item.get(attribute) {
                    key.insert(attribute.to_string(), value.clone());
                }
            }
            removed |= self.store.delete_item(&self.table_name, &key).await?;
        }
        Ok(removed)
    }

    /// Lists sessions, newest first, optionally filtered by pipeline and
    /// status. With no pipeline filter the status index is used; with
    /// neither filter the table is scanned and sorted client-side.
    pub async fn list_sessions(
        &self,
        pipeline_id: Option<&str>,
        status: Option<SessionStatus>,
        limit: usize,
    ) -> Result<Vec<Session>, BunsuiError> {
        let items = match (pipeline_id, status) {
            (Some(pipeline_id), status) => {
                let mut request = QueryRequest::new(&self.table_name)
                    .key_eq("pipeline_id", pipeline_id)
                    .on_index(index::SESSIONS_BY_PIPELINE)
                    .descending()
                    .limit(limit);
                if let Some(status) = status {
                    request = request.filter_eq("status", status.to_string());
                }
                self.store.query(&request).await?
            }
            (None, Some(status)) => {
                let request = QueryRequest::new(&self.table_name)
                    .key_eq("status", status.to_string())
                    .on_index(index::SESSIONS_BY_STATUS)
                    .descending()
                    .limit(limit);
                self.store.query(&request).await?
            }
            (None, None) => {
                let mut items = self
                    .store
                    .scan(&self.table_name, None, &Default::default(), &Default::default(), None)
                    .await?;
                items.sort_by(|a, b| {
                    let left = a.get("created_at").and_then(Value::as_str).unwrap_or_default();
                    let right = b.get("created_at").and_then(Value::as_str).unwrap_or_default();
                    right.cmp(left)
                });
                items.truncate(limit);
                items
            }
        };
        items.into_iter().map(item_to_session).collect()
    }

    /// Lists a user's sessions, newest first.
    pub async fn list_sessions_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>, BunsuiError> {
        let request = QueryRequest::new(&self.table_name)
            .key_eq("user_id", user_id)
            .on_index(index::SESSIONS_BY_USER)
            .descending()
            .limit(limit);
        let items = self.store.query(&request).await?;
        items.into_iter().map(item_to_session).collect()
    }

    /// Appends a checkpoint to a stored session. Returns false when the
    /// session does not exist.
    pub async fn add_checkpoint(&self, session_id: &str, checkpoint: Checkpoint) -> Result<bool, BunsuiError> {
        let Some(mut session) = self.get_session(session_id).await? else {
            return Ok(false);
        };
        session.add_checkpoint(checkpoint);
        self.update_session(&session).await?;
        Ok(true)
    }

    /// All checkpoints of a session, in recorded order.
    pub async fn get_session_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, BunsuiError> {
        Ok(self
            .get_session(session_id)
            .await?
            .map(|session| session.checkpoints().to_vec())
            .unwrap_or_default())
    }
}

fn session_to_item(session: &Session) -> Result<Item, BunsuiError> {
    match serde_json::to_value(session)? {
        Value::Object(map) => Ok(map),
        other => Err(BunsuiError::serialization(format!(
            "Session serialized to a non-object value: {}",
            other
        ))),
    }
}

fn item_to_session(item: Item) -> Result<Session, BunsuiError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}
