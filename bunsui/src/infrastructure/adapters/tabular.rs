// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tabular Store Adapter Contract
//!
//! The tabular store is a remote key-value store with composite primary keys
//! (hash + range) and global secondary indexes. This module defines the
//! adapter trait the repositories are written against, plus the schema
//! descriptor and request types shared by every implementation.
//!
//! ## Item model
//!
//! Items are JSON objects (`serde_json::Map<String, Value>`). Serialization
//! rules for the store:
//!
//! - dates are ISO-8601 strings (the entities' `datetime_serde` output)
//! - booleans and numbers are native JSON values
//! - nested maps and lists are preserved as-is
//! - binary attributes are not used
//!
//! ## Conditional writes
//!
//! `put_item` takes a [`PutCondition`]: creates are conditional on the
//! primary key not existing, updates on it existing. The conditional put is
//! the cross-process serialization fence for session mutations.
//!
//! ## Key conditions
//!
//! Queries carry a DynamoDB-style key condition expression with `#name` /
//! `:value` placeholders. Every repository access pattern compiles to a
//! single equality condition on a table or index hash key, ordered by the
//! range key; [`QueryRequest::key_eq`] builds exactly that shape.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use bunsui_domain::BunsuiError;

/// A stored row: a JSON object keyed by attribute name.
pub type Item = serde_json::Map<String, Value>;

/// Declares an attribute used in a key or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    /// Scalar type tag: `"S"` (string) or `"N"` (number).
    pub attribute_type: String,
}

impl AttributeDefinition {
    pub fn string(name: &str) -> Self {
        Self {
            attribute_name: name.to_string(),
            attribute_type: "S".to_string(),
        }
    }
}

/// Role of an attribute within a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

/// One element of a table or index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl KeySchemaElement {
    pub fn hash(name: &str) -> Self {
        Self {
            attribute_name: name.to_string(),
            key_type: KeyType::Hash,
        }
    }

    pub fn range(name: &str) -> Self {
        Self {
            attribute_name: name.to_string(),
            key_type: KeyType::Range,
        }
    }
}

/// Attribute projection of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// A global secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSecondaryIndex {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub projection: Projection,
}

/// Change stream configuration for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpecification {
    pub enabled: bool,
    /// View type, e.g. `"NEW_AND_OLD_IMAGES"`.
    pub view_type: String,
}

/// Complete table schema descriptor. Tables are created on demand from
/// these.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub key_schema: Vec<KeySchemaElement>,
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
    pub billing_mode: String,
    pub stream_specification: Option<StreamSpecification>,
    pub tags: HashMap<String, String>,
}

impl TableSchema {
    /// The hash key attribute name of the table's primary key.
    pub fn hash_key(&self) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|k| k.key_type == KeyType::Hash)
            .map(|k| k.attribute_name.as_str())
    }

    /// The range key attribute name of the table's primary key, if any.
    pub fn range_key(&self) -> Option<&str> {
        self.key_schema
            .iter()
            .find(|k| k.key_type == KeyType::Range)
            .map(|k| k.attribute_name.as_str())
    }

    pub fn index(&self, index_name: &str) -> Option<&GlobalSecondaryIndex> {
        self.global_secondary_indexes
            .iter()
            .find(|i| i.index_name == index_name)
    }
}

/// Write guard for `put_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutCondition {
    /// Unconditional upsert.
    #[default]
    None,
    /// The primary key must not already exist (create fence).
    MustNotExist,
    /// The primary key must already exist (update fence).
    MustExist,
}

/// A key-condition query against a table or one of its indexes.
///
/// The expression grammar is the store's (`#name = :value`, clauses joined
/// with `AND`); [`QueryRequest::key_eq`] and [`QueryRequest::filter_eq`]
/// generate it so repositories never hand-write expressions.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, Value>,
    pub limit: Option<usize>,
    /// True for ascending range-key order.
    pub scan_index_forward: bool,
}

impl QueryRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            scan_index_forward: true,
            ..Default::default()
        }
    }

    /// Adds an equality clause on `attribute` to the key condition.
    pub fn key_eq(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        let placeholder = format!("#k{}", self.expression_attribute_names.len());
        let value_placeholder = format!(":v{}", self.expression_attribute_values.len());
        if !self.key_condition_expression.is_empty() {
            self.key_condition_expression.push_str(" AND ");
        }
        self.key_condition_expression
            .push_str(&format!("{} = {}", placeholder, value_placeholder));
        self.expression_attribute_names
            .insert(placeholder, attribute.to_string());
        self.expression_attribute_values
            .insert(value_placeholder, value.into());
        self
    }

    /// Adds an equality clause on `attribute` to the post-query filter.
    pub fn filter_eq(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        let placeholder = format!("#f{}", self.expression_attribute_names.len());
        let value_placeholder = format!(":v{}", self.expression_attribute_values.len());
        let clause = format!("{} = {}", placeholder, value_placeholder);
        self.filter_expression = Some(match self.filter_expression.take() {
            Some(existing) => format!("{} AND {}", existing, clause),
            None => clause,
        });
        self.expression_attribute_names
            .insert(placeholder, attribute.to_string());
        self.expression_attribute_values
            .insert(value_placeholder, value.into());
        self
    }

    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.scan_index_forward = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Point-in-time description of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub table_name: String,
    pub status: String,
    pub item_count: u64,
}

/// Contract for the tabular store backing sessions, pipelines, and job
/// history. Implementations wrap the cloud SDK; an in-memory implementation
/// lives in [`crate::infrastructure::adapters::memory`].
#[async_trait]
pub trait TabularStoreAdapter: Send + Sync {
    /// Creates a table from its schema descriptor. Idempotent: an existing
    /// table with the same name is left untouched.
    async fn create_table(&self, schema: &TableSchema) -> Result<(), BunsuiError>;

    async fn delete_table(&self, table_name: &str) -> Result<(), BunsuiError>;

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, BunsuiError>;

    async fn table_exists(&self, table_name: &str) -> Result<bool, BunsuiError>;

    /// Writes an item, honoring the conditional-write fence.
    ///
    /// # Errors
    ///
    /// * `Validation` - condition failed (key exists for `MustNotExist`,
    ///   or is absent for `MustExist`)
    /// * `ResourceNotFound` - unknown table
    async fn put_item(&self, table_name: &str, item: Item, condition: PutCondition) -> Result<(), BunsuiError>;

    /// Reads one item by its full primary key.
    async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, BunsuiError>;

    /// Applies a `SET #a = :a, ...` update expression to one item.
    async fn update_item(
        &self,
        table_name: &str,
        key: &Item,
        update_expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
    ) -> Result<(), BunsuiError>;

    /// Deletes one item by its full primary key. Returns whether a row was
    /// removed; deleting a missing item is a no-op.
    async fn delete_item(&self, table_name: &str, key: &Item) -> Result<bool, BunsuiError>;

    /// Runs a key-condition query against the table or one of its indexes.
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Item>, BunsuiError>;

    /// Full scan with an optional filter expression.
    async fn scan(
        &self,
        table_name: &str,
        filter_expression: Option<&str>,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, BunsuiError>;

    /// Writes a batch of items unconditionally.
    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> Result<(), BunsuiError>;

    /// Reads a batch of items by full primary key; missing keys are skipped.
    async fn batch_get(&self, table_name: &str, keys: Vec<Item>) -> Result<Vec<Item>, BunsuiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder_generates_placeholders() {
        let request = QueryRequest::new("bunsui-sessions")
            .key_eq("pipeline_id", "p-1")
            .on_index("sessions-by-pipeline-index")
            .descending()
            .limit(10);

        assert_eq!(request.key_condition_expression, "#k0 = :v0");
        assert_eq!(
            request.expression_attribute_names.get("#k0"),
            Some(&"pipeline_id".to_string())
        );
        assert_eq!(
            request.expression_attribute_values.get(":v0"),
            Some(&Value::from("p-1"))
        );
        assert!(!request.scan_index_forward);
        assert_eq!(request.limit, Some(10));
    }

    #[test]
    fn test_query_builder_joins_clauses_with_and() {
        let request = QueryRequest::new("t").key_eq("a", 1).key_eq("b", 2).filter_eq("c", 3);
        assert_eq!(request.key_condition_expression, "#k0 = :v0 AND #k1 = :v1");
        assert_eq!(request.filter_expression.as_deref(), Some("#f2 = :v2"));
    }

    #[test]
    fn test_schema_key_helpers() {
        let schema = TableSchema {
            table_name: "t".to_string(),
            attribute_definitions: vec![AttributeDefinition::string("pk"), AttributeDefinition::string("sk")],
            key_schema: vec![KeySchemaElement::hash("pk"), KeySchemaElement::range("sk")],
            global_secondary_indexes: vec![GlobalSecondaryIndex {
                index_name: "by-other".to_string(),
                key_schema: vec![KeySchemaElement::hash("other")],
                projection: Projection::All,
            }],
            billing_mode: "PAY_PER_REQUEST".to_string(),
            stream_specification: None,
            tags: HashMap::new(),
        };
        assert_eq!(schema.hash_key(), Some("pk"));
        assert_eq!(schema.range_key(), Some("sk"));
        assert!(schema.index("by-other").is_some());
        assert!(schema.index("missing").is_none());
    }
}
