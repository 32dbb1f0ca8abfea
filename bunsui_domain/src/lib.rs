// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bunsui Domain
//!
//! Pure domain layer for the bunsui pipeline orchestration engine. This
//! crate holds the business objects and rules and is independent of external
//! concerns: no async runtime, no storage, no network.
//!
//! ## Module Structure
//!
//! - [`entities`]: objects with identity and lifecycle. `Pipeline` (a
//!   versioned, acyclic DAG of jobs, including the DAG engine itself),
//!   `Job`, `Operation` (tagged variants over Lambda/ECS/pass-through),
//!   `Session` with its `Checkpoint`s, and the `JobHistoryRecord` row shape.
//! - [`value_objects`]: immutable, self-validating values without identity.
//!   Currently `PipelineVersion`, the dotted version string whose patch
//!   segment is bumped by update operations.
//! - [`error`]: the [`BunsuiError`] taxonomy shared by every layer, with
//!   recoverability and stable error codes.
//! - [`services`]: domain support services, notably RFC3339 `datetime_serde`
//!   used by every timestamped entity.
//!
//! ## Design notes
//!
//! Ownership follows the aggregate boundaries: a pipeline owns its jobs by
//! value, a job owns its operations, a session owns its checkpoints. There
//! are no back-references in memory; a session points at its pipeline by id
//! only, so deserialized graphs are always trees.
//!
//! State machines (job and session status) are encoded in
//! `can_transition_to` tables on the status enums, and every mutation flows
//! through `transition_to`, which enforces the table and maintains the
//! timestamp invariants (first Running sets `started_at`, any terminal state
//! sets `completed_at`).

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

pub use error::BunsuiError;
