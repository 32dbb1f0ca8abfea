// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Adapter Implementations
//!
//! Process-local implementations of the scheduler, tabular-store, and
//! object-store contracts. They back the integration tests and local
//! development; the real cloud drivers live outside this workspace and
//! implement the same traits.
//!
//! The tabular store implements the equality subset of the key-condition
//! grammar that the repositories actually issue (`#name = :value` clauses
//! joined with `AND`). The scheduler exposes test hooks to drive execution
//! progress (`complete_execution`, `record_state_exit`,
//! `record_task_failed`) and a switch to make update calls fail, which the
//! executor's reconciliation fallback path needs coverage for.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bunsui_domain::BunsuiError;

use super::object_store::{ObjectMetadata, ObjectStoreAdapter};
use super::scheduler::{
    ExecutionDescription, ExecutionStatus, ExecutionSummary, HistoryEvent, SchedulerAdapter, StateMachineDetail,
    StateMachineSummary,
};
use super::tabular::{Item, KeySchemaElement, PutCondition, QueryRequest, TableDescription, TableSchema, TabularStoreAdapter};

// ---------------------------------------------------------------------------
// Expression parsing shared by query/scan/update
// ---------------------------------------------------------------------------

/// Resolves `#name = :value` clauses into `(attribute, value)` pairs.
fn parse_equalities(
    expression: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, Value>,
) -> Result<Vec<(String, Value)>, BunsuiError> {
    expression
        .split(" AND ")
        .map(|clause| {
            let (lhs, rhs) = clause
                .split_once('=')
                .ok_or_else(|| BunsuiError::validation(format!("Unsupported condition clause: {}", clause)))?;
            let lhs = lhs.trim();
            let rhs = rhs.trim();
            let attribute = if let Some(placeholder) = lhs.strip_prefix('#') {
                names
                    .get(&format!("#{}", placeholder))
                    .cloned()
                    .ok_or_else(|| BunsuiError::validation(format!("Unresolved name placeholder: {}", lhs)))?
            } else {
                lhs.to_string()
            };
            let value = if rhs.starts_with(':') {
                values
                    .get(rhs)
                    .cloned()
                    .ok_or_else(|| BunsuiError::validation(format!("Unresolved value placeholder: {}", rhs)))?
            } else {
                Value::String(rhs.to_string())
            };
            Ok((attribute, value))
        })
        .collect()
}

fn matches_all(item: &Item, conditions: &[(String, Value)]) -> bool {
    conditions
        .iter()
        .all(|(attribute, value)| item.get(attribute) == Some(value))
}

// ---------------------------------------------------------------------------
// Tabular store
// ---------------------------------------------------------------------------

struct TableData {
    schema: TableSchema,
    items: Vec<Item>,
}

/// In-memory tabular store with hash/range keys and GSI queries.
#[derive(Default)]
pub struct MemoryTabularStore {
    tables: Mutex<HashMap<String, TableData>>,
}

impl MemoryTabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn primary_key_of(schema: &TableSchema, item: &Item) -> Vec<(String, Value)> {
        schema
            .key_schema
            .iter()
            .filter_map(|k| {
                item.get(&k.attribute_name)
                    .map(|v| (k.attribute_name.clone(), v.clone()))
            })
            .collect()
    }

    fn key_schema_for<'a>(schema: &'a TableSchema, index_name: Option<&str>) -> Result<&'a [KeySchemaElement], BunsuiError> {
        match index_name {
            None => Ok(&schema.key_schema),
            Some(name) => schema
                .index(name)
                .map(|i| i.key_schema.as_slice())
                .ok_or_else(|| BunsuiError::resource_not_found(format!("Index not found: {}", name))),
        }
    }
}

#[async_trait]
impl TabularStoreAdapter for MemoryTabularStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), BunsuiError> {
        let mut tables = self.tables.lock();
        tables.entry(schema.table_name.clone()).or_insert_with(|| TableData {
            schema: schema.clone(),
            items: Vec::new(),
        });
        Ok(())
    }

    async fn delete_table(&self, table_name: &str) -> Result<(), BunsuiError> {
        let mut tables = self.tables.lock();
        tables
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, BunsuiError> {
        let tables = self.tables.lock();
        let table = tables
            .get(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;
        Ok(TableDescription {
            table_name: table_name.to_string(),
            status: "ACTIVE".to_string(),
            item_count: table.items.len() as u64,
        })
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool, BunsuiError> {
        Ok(self.tables.lock().contains_key(table_name))
    }

    async fn put_item(&self, table_name: &str, item: Item, condition: PutCondition) -> Result<(), BunsuiError> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;

        let key = Self::primary_key_of(&table.schema, &item);
        if key.len() != table.schema.key_schema.len() {
            return Err(BunsuiError::validation(format!(
                "Item is missing primary key attributes for table {}",
                table_name
            )));
        }

        let existing = table.items.iter().position(|i| matches_all(i, &key));
        match (condition, existing) {
            (PutCondition::MustNotExist, Some(_)) => Err(BunsuiError::validation(format!(
                "Conditional put failed: key already exists in {}",
                table_name
            ))),
            (PutCondition::MustExist, None) => Err(BunsuiError::validation(format!(
                "Conditional put failed: key does not exist in {}",
                table_name
            ))),
            (_, Some(position)) => {
                table.items[position] = item;
                Ok(())
            }
            (_, None) => {
                table.items.push(item);
                Ok(())
            }
        }
    }

    async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, BunsuiError> {
        let tables = self.tables.lock();
        let table = tables
            .get(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;
        let conditions: Vec<(String, Value)> = key.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(table.items.iter().find(|i| matches_all(i, &conditions)).cloned())
    }

    async fn update_item(
        &self,
        table_name: &str,
        key: &Item,
        update_expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
    ) -> Result<(), BunsuiError> {
        let assignments = update_expression
            .strip_prefix("SET ")
            .ok_or_else(|| BunsuiError::validation("Only SET update expressions are supported"))?;
        let mut updates = Vec::new();
        for assignment in assignments.split(',') {
            updates.extend(parse_equalities(assignment.trim(), names, values)?);
        }

        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;
        let conditions: Vec<(String, Value)> = key.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let item = table
            .items
            .iter_mut()
            .find(|i| matches_all(i, &conditions))
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Item not found in {}", table_name)))?;
        for (attribute, value) in updates {
            item.insert(attribute, value);
        }
        Ok(())
    }

    async fn delete_item(&self, table_name: &str, key: &Item) -> Result<bool, BunsuiError> {
        let mut tables = self.tables.lock();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;
        let conditions: Vec<(String, Value)> = key.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let before = table.items.len();
        table.items.retain(|i| !matches_all(i, &conditions));
        Ok(table.items.len() != before)
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<Item>, BunsuiError> {
        let key_conditions = parse_equalities(
            &request.key_condition_expression,
            &request.expression_attribute_names,
            &request.expression_attribute_values,
        )?;
        let filter_conditions = match &request.filter_expression {
            Some(expression) => parse_equalities(
                expression,
                &request.expression_attribute_names,
                &request.expression_attribute_values,
            )?,
            None => Vec::new(),
        };

        let tables = self.tables.lock();
        let table = tables
            .get(&request.table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", request.table_name)))?;
        let key_schema = Self::key_schema_for(&table.schema, request.index_name.as_deref())?;
        let range_attribute = key_schema
            .iter()
            .find(|k| k.key_type == super::tabular::KeyType::Range)
            .map(|k| k.attribute_name.clone());

        let mut matched: Vec<Item> = table
            .items
            .iter()
            .filter(|i| matches_all(i, &key_conditions) && matches_all(i, &filter_conditions))
            .cloned()
            .collect();

        if let Some(range) = &range_attribute {
            matched.sort_by(|a, b| {
                let left = a.get(range).map(value_sort_key).unwrap_or_default();
                let right = b.get(range).map(value_sort_key).unwrap_or_default();
                left.cmp(&right)
            });
        }
        if !request.scan_index_forward {
            matched.reverse();
        }
        if let Some(limit) = request.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn scan(
        &self,
        table_name: &str,
        filter_expression: Option<&str>,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, BunsuiError> {
        let conditions = match filter_expression {
            Some(expression) => parse_equalities(expression, names, values)?,
            None => Vec::new(),
        };
        let tables = self.tables.lock();
        let table = tables
            .get(table_name)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Table not found: {}", table_name)))?;
        let mut matched: Vec<Item> = table
            .items
            .iter()
            .filter(|i| matches_all(i, &conditions))
            .cloned()
            .collect();
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn batch_write(&self, table_name: &str, items: Vec<Item>) -> Result<(), BunsuiError> {
        for item in items {
            self.put_item(table_name, item, PutCondition::None).await?;
        }
        Ok(())
    }

    async fn batch_get(&self, table_name: &str, keys: Vec<Item>) -> Result<Vec<Item>, BunsuiError> {
        let mut results = Vec::new();
        for key in keys {
            if let Some(item) = self.get_item(table_name, &key).await? {
                results.push(item);
            }
        }
        Ok(results)
    }
}

/// Sort key that keeps numbers numeric and everything else lexicographic.
/// ISO-8601 range keys sort chronologically through the string branch.
fn value_sort_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{:>24}", n),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct StateMachineRecord {
    detail: StateMachineDetail,
}

struct ExecutionRecord {
    description: ExecutionDescription,
    events: Vec<HistoryEvent>,
    next_event_id: u64,
}

#[derive(Default)]
struct SchedulerState {
    machines: Vec<StateMachineRecord>,
    executions: HashMap<String, ExecutionRecord>,
}

/// In-memory scheduler with test hooks for driving execution progress.
pub struct MemoryScheduler {
    region: String,
    state: Mutex<SchedulerState>,
    fail_updates: AtomicBool,
}

impl MemoryScheduler {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(SchedulerState::default()),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent `update_state_machine` call fail. Used to
    /// exercise the create-with-suffix reconciliation fallback.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn machine_arn(&self, name: &str) -> String {
        format!("arn:aws:states:{}:123456789012:stateMachine:{}", self.region, name)
    }

    fn execution_arn(&self, machine_name: &str, execution_name: &str) -> String {
        format!(
            "arn:aws:states:{}:123456789012:execution:{}:{}",
            self.region, machine_name, execution_name
        )
    }

    fn push_event(record: &mut ExecutionRecord, event_type: &str, state_name: Option<&str>) {
        let event_id = record.next_event_id;
        record.next_event_id += 1;
        record.events.push(HistoryEvent {
            event_id,
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            state_name: state_name.map(String::from),
            error: None,
            cause: None,
        });
    }

    /// Marks a state as exited, as the scheduler does when a state finishes.
    pub fn record_state_exit(&self, execution_arn: &str, state_name: &str) {
        let mut state = self.state.lock();
        if let Some(record) = state.executions.get_mut(execution_arn) {
            Self::push_event(record, "TaskStateExited", Some(state_name));
        }
    }

    /// Records a task failure event for a state.
    pub fn record_task_failed(&self, execution_arn: &str, state_name: &str) {
        let mut state = self.state.lock();
        if let Some(record) = state.executions.get_mut(execution_arn) {
            Self::push_event(record, "TaskStateFailed", Some(state_name));
        }
    }

    /// Drives an execution to a terminal status.
    pub fn complete_execution(&self, execution_arn: &str, status: ExecutionStatus, cause: Option<&str>) {
        let mut state = self.state.lock();
        if let Some(record) = state.executions.get_mut(execution_arn) {
            record.description.status = status;
            record.description.stop_date = Some(Utc::now());
            record.description.cause = cause.map(String::from);
            let event_type = match status {
                ExecutionStatus::Succeeded => "ExecutionSucceeded",
                ExecutionStatus::Failed => "ExecutionFailed",
                ExecutionStatus::Aborted => "ExecutionAborted",
                ExecutionStatus::TimedOut => "ExecutionTimedOut",
                _ => "ExecutionStatusChanged",
            };
            Self::push_event(record, event_type, None);
        }
    }
}

#[async_trait]
impl SchedulerAdapter for MemoryScheduler {
    async fn create_state_machine(
        &self,
        name: &str,
        definition: &str,
        role_arn: &str,
        description: Option<&str>,
        tags: &HashMap<String, String>,
    ) -> Result<String, BunsuiError> {
        let mut state = self.state.lock();
        if state.machines.iter().any(|m| m.detail.name == name) {
            return Err(BunsuiError::validation(format!(
                "State machine already exists: {}",
                name
            )));
        }
        let arn = self.machine_arn(name);
        state.machines.push(StateMachineRecord {
            detail: StateMachineDetail {
                name: name.to_string(),
                state_machine_arn: arn.clone(),
                definition: definition.to_string(),
                role_arn: role_arn.to_string(),
                description: description.map(String::from),
                creation_date: Utc::now(),
                tags: tags.clone(),
            },
        });
        Ok(arn)
    }

    async fn update_state_machine(
        &self,
        state_machine_arn: &str,
        definition: Option<&str>,
        role_arn: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), BunsuiError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(BunsuiError::service_unavailable(
                "State machine update rejected by backend",
            ));
        }
        let mut state = self.state.lock();
        let machine = state
            .machines
            .iter_mut()
            .find(|m| m.detail.state_machine_arn == state_machine_arn)
            .ok_or_else(|| {
                BunsuiError::resource_not_found(format!("State machine not found: {}", state_machine_arn))
            })?;
        if let Some(definition) = definition {
            machine.detail.definition = definition.to_string();
        }
        if let Some(role_arn) = role_arn {
            machine.detail.role_arn = role_arn.to_string();
        }
        if let Some(description) = description {
            machine.detail.description = Some(description.to_string());
        }
        Ok(())
    }

    async fn delete_state_machine(&self, state_machine_arn: &str) -> Result<(), BunsuiError> {
        let mut state = self.state.lock();
        let before = state.machines.len();
        state.machines.retain(|m| m.detail.state_machine_arn != state_machine_arn);
        if state.machines.len() == before {
            return Err(BunsuiError::resource_not_found(format!(
                "State machine not found: {}",
                state_machine_arn
            )));
        }
        Ok(())
    }

    async fn describe_state_machine(&self, state_machine_arn: &str) -> Result<StateMachineDetail, BunsuiError> {
        let state = self.state.lock();
        state
            .machines
            .iter()
            .find(|m| m.detail.state_machine_arn == state_machine_arn)
            .map(|m| m.detail.clone())
            .ok_or_else(|| BunsuiError::resource_not_found(format!("State machine not found: {}", state_machine_arn)))
    }

    async fn list_state_machines(&self, max_results: Option<usize>) -> Result<Vec<StateMachineSummary>, BunsuiError> {
        let state = self.state.lock();
        let mut summaries: Vec<StateMachineSummary> = state
            .machines
            .iter()
            .map(|m| StateMachineSummary {
                name: m.detail.name.clone(),
                state_machine_arn: m.detail.state_machine_arn.clone(),
                creation_date: m.detail.creation_date,
            })
            .collect();
        if let Some(max) = max_results {
            summaries.truncate(max);
        }
        Ok(summaries)
    }

    async fn start_execution(
        &self,
        state_machine_arn: &str,
        name: Option<&str>,
        input: Option<&str>,
    ) -> Result<String, BunsuiError> {
        let mut state = self.state.lock();
        let machine_name = state
            .machines
            .iter()
            .find(|m| m.detail.state_machine_arn == state_machine_arn)
            .map(|m| m.detail.name.clone())
            .ok_or_else(|| {
                BunsuiError::resource_not_found(format!("State machine not found: {}", state_machine_arn))
            })?;

        let execution_name = name
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let execution_arn = self.execution_arn(&machine_name, &execution_name);
        if state.executions.contains_key(&execution_arn) {
            return Err(BunsuiError::validation(format!(
                "Execution name already in use: {}",
                execution_name
            )));
        }

        let mut record = ExecutionRecord {
            description: ExecutionDescription {
                execution_arn: execution_arn.clone(),
                state_machine_arn: state_machine_arn.to_string(),
                name: execution_name,
                status: ExecutionStatus::Running,
                start_date: Some(Utc::now()),
                stop_date: None,
                input: input.map(String::from),
                output: None,
                error: None,
                cause: None,
            },
            events: Vec::new(),
            next_event_id: 1,
        };
        Self::push_event(&mut record, "ExecutionStarted", None);
        state.executions.insert(execution_arn.clone(), record);
        Ok(execution_arn)
    }

    async fn stop_execution(
        &self,
        execution_arn: &str,
        error: Option<&str>,
        cause: Option<&str>,
    ) -> Result<(), BunsuiError> {
        let mut state = self.state.lock();
        let record = state
            .executions
            .get_mut(execution_arn)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Execution not found: {}", execution_arn)))?;
        if !record.description.status.is_terminal() {
            record.description.status = ExecutionStatus::Aborted;
            record.description.stop_date = Some(Utc::now());
            record.description.error = error.map(String::from);
            record.description.cause = cause.map(String::from);
            Self::push_event(record, "ExecutionAborted", None);
        }
        Ok(())
    }

    async fn describe_execution(&self, execution_arn: &str) -> Result<ExecutionDescription, BunsuiError> {
        let state = self.state.lock();
        state
            .executions
            .get(execution_arn)
            .map(|r| r.description.clone())
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Execution not found: {}", execution_arn)))
    }

    async fn list_executions(
        &self,
        state_machine_arn: &str,
        status_filter: Option<ExecutionStatus>,
        max_results: Option<usize>,
    ) -> Result<Vec<ExecutionSummary>, BunsuiError> {
        let state = self.state.lock();
        let mut summaries: Vec<ExecutionSummary> = state
            .executions
            .values()
            .filter(|r| r.description.state_machine_arn == state_machine_arn)
            .filter(|r| status_filter.is_none_or(|s| r.description.status == s))
            .map(|r| ExecutionSummary {
                execution_arn: r.description.execution_arn.clone(),
                name: r.description.name.clone(),
                status: r.description.status,
                start_date: r.description.start_date,
                stop_date: r.description.stop_date,
            })
            .collect();
        summaries.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        if let Some(max) = max_results {
            summaries.truncate(max);
        }
        Ok(summaries)
    }

    async fn get_execution_history(
        &self,
        execution_arn: &str,
        max_results: Option<usize>,
        reverse_order: bool,
    ) -> Result<Vec<HistoryEvent>, BunsuiError> {
        let state = self.state.lock();
        let record = state
            .executions
            .get(execution_arn)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Execution not found: {}", execution_arn)))?;
        let mut events = record.events.clone();
        if reverse_order {
            events.reverse();
        }
        if let Some(max) = max_results {
            events.truncate(max);
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: Option<String>,
    #[allow(dead_code)]
    metadata: HashMap<String, String>,
    last_modified: chrono::DateTime<Utc>,
}

/// In-memory object store with prefix listings and fake presigned URLs.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor with a pre-created bucket.
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        let store = Self::default();
        store.buckets.lock().insert(bucket.into(), BTreeMap::new());
        store
    }
}

#[async_trait]
impl ObjectStoreAdapter for MemoryObjectStore {
    async fn create_bucket(&self, bucket: &str, _region: Option<&str>) -> Result<(), BunsuiError> {
        self.buckets.lock().entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BunsuiError> {
        let mut buckets = self.buckets.lock();
        match buckets.get(bucket) {
            Some(objects) if !objects.is_empty() => {
                Err(BunsuiError::validation(format!("Bucket not empty: {}", bucket)))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
            None => Err(BunsuiError::resource_not_found(format!("Bucket not found: {}", bucket))),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BunsuiError> {
        Ok(self.buckets.lock().contains_key(bucket))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> Result<(), BunsuiError> {
        let mut buckets = self.buckets.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Bucket not found: {}", bucket)))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.map(String::from),
                metadata: metadata.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BunsuiError> {
        let buckets = self.buckets.lock();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Bucket not found: {}", bucket)))?;
        Ok(objects.get(key).map(|o| o.body.clone()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, BunsuiError> {
        let mut buckets = self.buckets.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Bucket not found: {}", bucket)))?;
        Ok(objects.remove(key).is_some())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<Vec<ObjectMetadata>, BunsuiError> {
        let buckets = self.buckets.lock();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Bucket not found: {}", bucket)))?;
        let mut listed: Vec<ObjectMetadata> = objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, object)| ObjectMetadata {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: object.last_modified,
                content_type: object.content_type.clone(),
            })
            .collect();
        if let Some(max) = max_keys {
            listed.truncate(max);
        }
        Ok(listed)
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), BunsuiError> {
        let mut buckets = self.buckets.lock();
        let object = buckets
            .get(source_bucket)
            .and_then(|objects| objects.get(source_key))
            .cloned()
            .ok_or_else(|| {
                BunsuiError::resource_not_found(format!("Object not found: {}/{}", source_bucket, source_key))
            })?;
        let destination = buckets
            .get_mut(dest_bucket)
            .ok_or_else(|| BunsuiError::resource_not_found(format!("Bucket not found: {}", dest_bucket)))?;
        destination.insert(dest_key.to_string(), object);
        Ok(())
    }

    async fn presigned_get_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, BunsuiError> {
        Ok(format!(
            "memory://{}/{}?method=GET&expires_in={}",
            bucket,
            key,
            expires_in.as_secs()
        ))
    }

    async fn presigned_put_url(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, BunsuiError> {
        Ok(format!(
            "memory://{}/{}?method=PUT&expires_in={}",
            bucket,
            key,
            expires_in.as_secs()
        ))
    }
}
