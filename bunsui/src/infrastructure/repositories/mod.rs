// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tabular-Store Repositories
//!
//! Persistence for sessions, pipelines, and job history over the
//! [`TabularStoreAdapter`](crate::infrastructure::adapters::TabularStoreAdapter)
//! contract, plus the table schema catalog they are created from.

pub mod job_history_repository;
pub mod pipeline_repository;
pub mod schema;
pub mod session_repository;

pub use job_history_repository::JobHistoryRepository;
pub use pipeline_repository::PipelineRepository;
pub use session_repository::SessionRepository;
