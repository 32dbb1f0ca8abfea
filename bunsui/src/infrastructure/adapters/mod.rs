// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adapter Contracts
//!
//! The engine reaches the cloud exclusively through these adapter traits:
//! the workflow scheduler, the tabular store, and the object store. The real
//! SDK drivers live outside this workspace; the in-memory implementations in
//! [`memory`] serve tests and local development.

pub mod memory;
pub mod object_store;
pub mod scheduler;
pub mod tabular;

pub use memory::{MemoryObjectStore, MemoryScheduler, MemoryTabularStore};
pub use object_store::{ObjectMetadata, ObjectStoreAdapter};
pub use scheduler::{
    ExecutionDescription, ExecutionStatus, ExecutionSummary, HistoryEvent, SchedulerAdapter, StateMachineDetail,
    StateMachineSummary,
};
pub use tabular::{
    AttributeDefinition, GlobalSecondaryIndex, Item, KeySchemaElement, KeyType, Projection, PutCondition,
    QueryRequest, StreamSpecification, TableDescription, TableSchema, TabularStoreAdapter,
};
