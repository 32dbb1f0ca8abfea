// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Compiler
//!
//! Translates validated pipelines into scheduler state-machine definitions:
//! [`states`] holds the neutral definition tree, [`generator`] the
//! compilation itself.

pub mod generator;
pub mod states;

pub use generator::{CompiledStateMachine, StateMachineCompiler, DEFAULT_RETRYABLE_ERRORS};
pub use states::{
    Branch, CatchRule, FailState, ParallelState, PassState, RetryRule, State, StateMachineDefinition, SucceedState,
    TaskState,
};
