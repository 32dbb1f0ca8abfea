// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service Wiring
//!
//! [`Services`] is the explicit composition root of the engine: it owns the
//! shared adapter handles and the services wired over them, and is threaded
//! through by-reference instead of any process-global state. Build it once
//! at startup and share it; the configuration inside is immutable.

use std::sync::Arc;

use bunsui_domain::BunsuiError;

use crate::compiler::StateMachineCompiler;
use crate::infrastructure::adapters::{
    MemoryObjectStore, MemoryScheduler, MemoryTabularStore, ObjectStoreAdapter, SchedulerAdapter, TabularStoreAdapter,
};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::repositories::schema::all_table_schemas;
use crate::infrastructure::repositories::{JobHistoryRepository, PipelineRepository, SessionRepository};
use crate::infrastructure::storage::ObjectStorageManager;
use crate::logs::LogService;
use crate::session::{PipelineExecutor, SessionManager};

/// The engine's wired service graph over one set of adapter handles.
///
/// Adapter clients are shared across every session hosted by the process;
/// repositories and services hold `Arc`s to them.
pub struct Services {
    pub config: EngineConfig,
    pub scheduler: Arc<dyn SchedulerAdapter>,
    pub tabular_store: Arc<dyn TabularStoreAdapter>,
    pub object_store: Arc<dyn ObjectStoreAdapter>,
    pub sessions: Arc<SessionRepository>,
    pub pipelines: Arc<PipelineRepository>,
    pub job_history: Arc<JobHistoryRepository>,
    pub storage: Arc<ObjectStorageManager>,
    pub session_manager: Arc<SessionManager>,
    pub executor: Arc<PipelineExecutor>,
    pub log_service: Arc<LogService>,
}

impl Services {
    /// Wires the full service graph over the given adapters.
    pub fn new(
        config: EngineConfig,
        scheduler: Arc<dyn SchedulerAdapter>,
        tabular_store: Arc<dyn TabularStoreAdapter>,
        object_store: Arc<dyn ObjectStoreAdapter>,
    ) -> Self {
        let sessions = Arc::new(SessionRepository::new(tabular_store.clone(), config.table_prefix.as_str()));
        let pipelines = Arc::new(PipelineRepository::new(tabular_store.clone(), config.table_prefix.as_str()));
        let job_history = Arc::new(JobHistoryRepository::new(
            tabular_store.clone(),
            config.table_prefix.as_str(),
        ));
        let storage = Arc::new(ObjectStorageManager::new(object_store.clone(), config.bucket.as_str()));

        let compiler = StateMachineCompiler::new()
            .with_name_prefix(config.state_machine_prefix.as_str())
            .with_environment(config.environment.as_str());
        let session_manager = Arc::new(SessionManager::new(sessions.clone()).with_scheduler(scheduler.clone()));
        let executor = Arc::new(PipelineExecutor::new(
            scheduler.clone(),
            sessions.clone(),
            compiler,
            config.execution_role_arn.as_str(),
        ));
        let log_service = Arc::new(LogService::new(storage.clone(), sessions.clone()));

        Self {
            config,
            scheduler,
            tabular_store,
            object_store,
            sessions,
            pipelines,
            job_history,
            storage,
            session_manager,
            executor,
            log_service,
        }
    }

    /// Wires the graph over the in-memory adapters. Used by tests and local
    /// development.
    pub fn in_memory(config: EngineConfig) -> Self {
        let scheduler = Arc::new(MemoryScheduler::new(config.region.as_str()));
        let tabular_store = Arc::new(MemoryTabularStore::new());
        let object_store = Arc::new(MemoryObjectStore::new());
        Self::new(config, scheduler, tabular_store, object_store)
    }

    /// Creates the tables and the bucket the engine persists into.
    pub async fn initialize(&self) -> Result<(), BunsuiError> {
        for schema in all_table_schemas(&self.config.table_prefix) {
            self.tabular_store.create_table(&schema).await?;
        }
        self.object_store
            .create_bucket(&self.config.bucket, Some(&self.config.region))
            .await?;
        Ok(())
    }
}
