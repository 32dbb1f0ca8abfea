// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Object-store management: the three-tier path scheme over logs, reports,
//! and pipeline configs.

pub mod object_manager;

pub use object_manager::ObjectStorageManager;
