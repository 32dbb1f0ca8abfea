// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Log aggregation and query over the object store.

pub mod service;

pub use service::{JobLogStats, LogEntry, LogFilter, LogFormat, LogLevel, LogService, LogSummary, TimeRange};
