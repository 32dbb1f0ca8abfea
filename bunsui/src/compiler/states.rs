// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # State-Machine Definition Tree
//!
//! A neutral, typed representation of the scheduler's state-machine
//! language. The compiler builds this tree; it is serialized to the JSON
//! wire format only at the scheduler-adapter edge, so no internal code is
//! coupled to the document shape.
//!
//! The wire format uses PascalCase keys (`StartAt`, `States`,
//! `TimeoutSeconds`) and a `Type` tag per state. Dynamic JSONPath fields
//! inside `Parameters` keep their `.$` suffix convention
//! (`"session_id.$": "$.session_id"`); those live in plain
//! `serde_json::Value` maps since their keys are data, not schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A retry rule attached to a task or parallel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryRule {
    pub error_equals: Vec<String>,
    pub interval_seconds: u32,
    pub max_attempts: u32,
    pub backoff_rate: f64,
}

/// A catch rule redirecting matched errors to another state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchRule {
    pub error_equals: Vec<String>,
    pub next: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

impl CatchRule {
    /// Catch-all rule preserving the error under `$.error`.
    pub fn all_to(next: impl Into<String>) -> Self {
        Self {
            error_equals: vec!["States.ALL".to_string()],
            next: next.into(),
            result_path: Some("$.error".to_string()),
        }
    }
}

/// No-op state that may reshape the document and advance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

/// A remote work item: one scheduler service integration call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

/// One branch of a parallel state: a self-contained sub-state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Branch {
    pub start_at: String,
    pub states: BTreeMap<String, State>,
}

/// Concurrent execution of several branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParallelState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub branches: Vec<Branch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<bool>,
}

/// Terminal success state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SucceedState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Terminal failure state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named state of the machine, tagged by `Type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum State {
    Pass(PassState),
    Task(TaskState),
    Parallel(ParallelState),
    Succeed(SucceedState),
    Fail(FailState),
}

impl State {
    /// The `Next` target of this state, if it has one.
    pub fn next(&self) -> Option<&str> {
        match self {
            State::Pass(s) => s.next.as_deref(),
            State::Task(s) => s.next.as_deref(),
            State::Parallel(s) => s.next.as_deref(),
            State::Succeed(_) | State::Fail(_) => None,
        }
    }

    /// Sets the `Next` target. No-op for terminal state kinds.
    pub fn set_next(&mut self, next: impl Into<String>) {
        let next = next.into();
        match self {
            State::Pass(s) => s.next = Some(next),
            State::Task(s) => s.next = Some(next),
            State::Parallel(s) => s.next = Some(next),
            State::Succeed(_) | State::Fail(_) => {}
        }
    }
}

/// The complete state-machine document handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineDefinition {
    pub comment: String,
    pub start_at: String,
    pub states: BTreeMap<String, State>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
}

impl StateMachineDefinition {
    /// Serializes the definition to its JSON wire form.
    pub fn to_json(&self) -> Result<String, bunsui_domain::BunsuiError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes the definition to a JSON value tree, the form used for
    /// semantic (key-order-insensitive) comparison during reconciliation.
    pub fn to_value(&self) -> Result<Value, bunsui_domain::BunsuiError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_with_type_tag() {
        let state = State::Succeed(SucceedState {
            comment: Some("Pipeline completed successfully".to_string()),
        });
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["Type"], "Succeed");
        assert_eq!(json["Comment"], "Pipeline completed successfully");
    }

    #[test]
    fn test_task_state_wire_shape() {
        let state = State::Task(TaskState {
            resource: "arn:aws:states:::lambda:invoke".to_string(),
            comment: None,
            parameters: Some(serde_json::json!({
                "FunctionName": "arn:aws:lambda:us-east-1:1:function:f",
                "Payload": {"input.$": "$"}
            })),
            result_path: Some("$.operation_results.op-1".to_string()),
            timeout_seconds: Some(300),
            retry: vec![RetryRule {
                error_equals: vec!["Lambda.ServiceException".to_string()],
                interval_seconds: 60,
                max_attempts: 3,
                backoff_rate: 2.0,
            }],
            catch: vec![CatchRule::all_to("PipelineFailure")],
            next: Some("Job_a_End".to_string()),
            end: None,
        });

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["Type"], "Task");
        assert_eq!(json["Resource"], "arn:aws:states:::lambda:invoke");
        assert_eq!(json["TimeoutSeconds"], 300);
        assert_eq!(json["Retry"][0]["ErrorEquals"][0], "Lambda.ServiceException");
        assert_eq!(json["Retry"][0]["BackoffRate"], 2.0);
        assert_eq!(json["Catch"][0]["Next"], "PipelineFailure");
        assert_eq!(json["Catch"][0]["ResultPath"], "$.error");
        assert_eq!(json["Next"], "Job_a_End");
        assert!(json.get("End").is_none());
    }

    #[test]
    fn test_definition_round_trip() {
        let mut states = BTreeMap::new();
        states.insert(
            "Only".to_string(),
            State::Pass(PassState {
                next: None,
                end: Some(true),
                ..Default::default()
            }),
        );
        let definition = StateMachineDefinition {
            comment: "State machine for pipeline: demo".to_string(),
            start_at: "Only".to_string(),
            states,
            timeout_seconds: Some(3600),
        };

        let json = definition.to_json().unwrap();
        assert!(json.contains("\"StartAt\":\"Only\""));
        let back: StateMachineDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, definition);
    }

    #[test]
    fn test_set_next_ignores_terminal_states() {
        let mut state = State::Fail(FailState::default());
        state.set_next("Somewhere");
        assert_eq!(state.next(), None);

        let mut state = State::Pass(PassState::default());
        state.set_next("Somewhere");
        assert_eq!(state.next(), Some("Somewhere"));
    }
}
