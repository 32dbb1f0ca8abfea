// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bunsui
//!
//! Pipeline orchestration engine on a managed cloud backend. A pipeline is
//! a versioned DAG of jobs; a session is one execution instance of it. The
//! engine compiles pipelines into scheduler state-machine definitions,
//! drives session lifecycles with persisted checkpoints, persists
//! everything behind tabular- and object-store adapters, and aggregates
//! operation logs on demand.
//!
//! ## Layout
//!
//! - [`compiler`]: pipeline-to-state-machine translation over a neutral
//!   definition tree, serialized to the wire format at the scheduler edge
//! - [`session`]: the session manager (lifecycle, checkpoints, callbacks)
//!   and the pipeline executor (execution start, reconciliation, polling)
//! - [`infrastructure`]: adapter contracts with in-memory implementations,
//!   tabular-store repositories, object-storage management, resilience
//!   utilities, and the engine configuration
//! - [`logs`]: the log aggregation and query service
//! - [`services`]: the explicit wiring value threaded through constructors
//!
//! The domain model (entities, state machines, errors) lives in the
//! `bunsui-domain` crate; this crate re-exports its error type for
//! convenience.
//!
//! ## Example
//!
//! ```no_run
//! use bunsui::infrastructure::EngineConfig;
//! use bunsui::services::Services;
//! use bunsui::session::CreateSessionOptions;
//!
//! # async fn run() -> Result<(), bunsui::BunsuiError> {
//! let services = Services::in_memory(EngineConfig::default());
//! services.initialize().await?;
//!
//! let session = services
//!     .session_manager
//!     .create_session("pipeline-1", 3, CreateSessionOptions::default())
//!     .await?;
//! services.session_manager.start_session(session.session_id()).await?;
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod infrastructure;
pub mod logs;
pub mod services;
pub mod session;

pub use bunsui_domain::BunsuiError;
pub use services::Services;
