// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # State-Machine Compiler
//!
//! Translates a validated [`Pipeline`] into a registered state-machine
//! definition for the scheduler. Each job in topological order contributes
//! three named states:
//!
//! - `Job_<id>_Start` (Pass): seeds the job's input envelope
//! - `Job_<id>_Operations`: a Pass forwarding to the single operation state,
//!   or a Parallel state with one branch per operation
//! - `Job_<id>_End` (Pass): stamps the completion marker and advances to the
//!   next job's start state, or to `PipelineSuccess` for the last job
//!
//! Operation states are chosen by operation kind: Lambda and ECS compile to
//! Task states against the scheduler's service integrations; every other
//! kind compiles to a "skipped" Pass that copies the operation metadata
//! through. Task states carry a Retry array over a configurable list of
//! service exception classes and, at the top level, a catch-all to
//! `PipelineFailure`. Operation states inside Parallel branches terminate
//! their branch instead; the branch's failures surface through the Parallel
//! state's own catch-all, which keeps every catch target inside its scope.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use bunsui_domain::entities::{Job, Operation, OperationType, Pipeline};
use bunsui_domain::BunsuiError;

use super::states::{
    Branch, CatchRule, FailState, ParallelState, PassState, RetryRule, State, StateMachineDefinition, SucceedState,
    TaskState,
};

/// Error-equals classes that warrant a Retry on operation states. The exact
/// set is integration-specific, so it is configurable on the compiler.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "Lambda.ServiceException",
    "Lambda.AWSLambdaException",
    "Lambda.SdkClientException",
];

/// A compiled, registerable state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStateMachine {
    /// Registered name: `{prefix}-{pipeline_id}-{version}`.
    pub name: String,
    pub definition: StateMachineDefinition,
    pub role_arn: String,
    pub description: String,
    pub tags: HashMap<String, String>,
}

impl CompiledStateMachine {
    /// The definition in its JSON wire form.
    pub fn definition_json(&self) -> Result<String, BunsuiError> {
        self.definition.to_json()
    }
}

/// Compiles pipelines into scheduler state-machine definitions.
#[derive(Debug, Clone)]
pub struct StateMachineCompiler {
    name_prefix: String,
    environment: String,
    retryable_errors: Vec<String>,
}

impl Default for StateMachineCompiler {
    fn default() -> Self {
        Self {
            name_prefix: "bunsui".to_string(),
            environment: "production".to_string(),
            retryable_errors: DEFAULT_RETRYABLE_ERRORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StateMachineCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the registered-name prefix (deployment knob).
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Overrides the environment tag stamped on registered machines.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Overrides the error-equals classes retried on operation states.
    pub fn with_retryable_errors(mut self, errors: Vec<String>) -> Self {
        self.retryable_errors = errors;
        self
    }

    /// Compiles `pipeline` into a registerable state machine.
    ///
    /// # Errors
    ///
    /// * `Validation` - unresolved dependencies or a cyclic graph
    pub fn compile(&self, pipeline: &Pipeline, role_arn: &str) -> Result<CompiledStateMachine, BunsuiError> {
        if !pipeline.validate_dependencies() {
            return Err(BunsuiError::validation(
                "Pipeline has dependencies that do not resolve to jobs in the pipeline",
            ));
        }
        let cycles = pipeline.detect_cycles();
        if !cycles.is_empty() {
            return Err(BunsuiError::validation(format!(
                "Pipeline has dependency cycles: {:?}",
                cycles
            )));
        }

        let execution_order = pipeline.execution_order()?;
        let mut states: BTreeMap<String, State> = BTreeMap::new();

        for (position, job_id) in execution_order.iter().enumerate() {
            let job = pipeline
                .get_job(job_id)
                .ok_or_else(|| BunsuiError::internal(format!("Execution order names unknown job {}", job_id)))?;
            let after_end = match execution_order.get(position + 1) {
                Some(next_job_id) => format!("Job_{}_Start", next_job_id),
                None => "PipelineSuccess".to_string(),
            };
            self.add_job_states(&mut states, job, &after_end);
        }

        states.insert(
            "PipelineSuccess".to_string(),
            State::Succeed(SucceedState {
                comment: Some("Pipeline completed successfully".to_string()),
            }),
        );
        states.insert(
            "PipelineFailure".to_string(),
            State::Fail(FailState {
                comment: Some("Pipeline failed".to_string()),
                cause: Some("One or more jobs failed".to_string()),
                error: None,
            }),
        );

        let start_at = execution_order
            .first()
            .map(|job_id| format!("Job_{}_Start", job_id))
            .unwrap_or_else(|| "PipelineSuccess".to_string());

        let definition = StateMachineDefinition {
            comment: format!("State machine for pipeline: {}", pipeline.name()),
            start_at,
            states,
            timeout_seconds: Some(pipeline.timeout_seconds()),
        };

        let mut tags = HashMap::new();
        tags.insert("pipeline".to_string(), pipeline.pipeline_id().to_string());
        tags.insert("version".to_string(), pipeline.version().to_string());
        tags.insert("environment".to_string(), self.environment.clone());

        Ok(CompiledStateMachine {
            name: format!(
                "{}-{}-{}",
                self.name_prefix,
                pipeline.pipeline_id(),
                pipeline.version()
            ),
            definition,
            role_arn: role_arn.to_string(),
            description: format!("Pipeline: {} (v{})", pipeline.name(), pipeline.version()),
            tags,
        })
    }

    fn add_job_states(&self, states: &mut BTreeMap<String, State>, job: &Job, after_end: &str) {
        let start_name = format!("Job_{}_Start", job.job_id());
        let operations_name = format!("Job_{}_Operations", job.job_id());
        let end_name = format!("Job_{}_End", job.job_id());

        states.insert(
            start_name,
            State::Pass(PassState {
                comment: Some(format!("Starting job: {}", job.name())),
                parameters: Some(json!({
                    "job_id": job.job_id(),
                    "job_name": job.name(),
                    "pipeline_id.$": "$.pipeline_id",
                    "session_id.$": "$.session_id",
                    "started_at.$": "$$.State.EnteredTime",
                })),
                result_path: Some("$.current_job".to_string()),
                next: Some(operations_name.clone()),
                end: None,
            }),
        );

        match job.operations() {
            [] => {
                // A job with no operations degenerates to a direct hop.
                states.insert(
                    operations_name,
                    State::Pass(PassState {
                        next: Some(end_name.clone()),
                        ..Default::default()
                    }),
                );
            }
            [operation] => {
                let operation_name = format!("Operation_{}", operation.operation_id());
                states.insert(
                    operations_name,
                    State::Pass(PassState {
                        next: Some(operation_name.clone()),
                        ..Default::default()
                    }),
                );
                states.insert(
                    operation_name,
                    self.operation_state(job, operation, Some(end_name.clone()), true),
                );
            }
            operations => {
                let branches = operations
                    .iter()
                    .map(|operation| {
                        let operation_name = format!("Operation_{}", operation.operation_id());
                        let mut branch_states = BTreeMap::new();
                        branch_states.insert(operation_name.clone(), self.operation_state(job, operation, None, false));
                        Branch {
                            start_at: operation_name,
                            states: branch_states,
                        }
                    })
                    .collect();
                states.insert(
                    operations_name,
                    State::Parallel(ParallelState {
                        comment: Some(format!("Execute operations for job: {}", job.name())),
                        branches,
                        result_path: None,
                        retry: Vec::new(),
                        catch: vec![CatchRule::all_to("PipelineFailure")],
                        next: Some(end_name.clone()),
                        end: None,
                    }),
                );
            }
        }

        states.insert(
            end_name,
            State::Pass(PassState {
                comment: Some(format!("Completed job: {}", job.name())),
                parameters: Some(json!({
                    "job_id": job.job_id(),
                    "status": "completed",
                    "completed_at.$": "$$.State.EnteredTime",
                })),
                result_path: Some("$.job_result".to_string()),
                next: Some(after_end.to_string()),
                end: None,
            }),
        );
    }

    /// Builds the state for one operation. `next` is set for top-level
    /// states; branch states end their branch instead. `top_level` controls
    /// whether the catch-all to `PipelineFailure` is attached.
    fn operation_state(&self, job: &Job, operation: &Operation, next: Option<String>, top_level: bool) -> State {
        let result_path = format!("$.operation_results.{}", operation.operation_id());
        let end = next.is_none().then_some(true);

        match operation.operation_type() {
            OperationType::Lambda => State::Task(TaskState {
                resource: "arn:aws:states:::lambda:invoke".to_string(),
                comment: Some(format!("Execute Lambda operation: {}", operation.name())),
                parameters: Some(json!({
                    "FunctionName": operation.config().resource_arn,
                    "Payload": {
                        "job_id": job.job_id(),
                        "operation_id": operation.operation_id(),
                        "pipeline_id.$": "$.pipeline_id",
                        "session_id.$": "$.session_id",
                        "input.$": "$",
                        "parameters": sorted_object(&operation.config().parameters),
                        "environment": sorted_env(&operation.config().environment_variables),
                    },
                })),
                result_path: Some(result_path),
                timeout_seconds: Some(operation.config().timeout_seconds),
                retry: self.retry_rules(operation),
                catch: if top_level {
                    vec![CatchRule::all_to("PipelineFailure")]
                } else {
                    Vec::new()
                },
                next,
                end,
            }),
            OperationType::Ecs => {
                let parameters = &operation.config().parameters;
                let cluster = parameters
                    .get("cluster")
                    .and_then(Value::as_str)
                    .unwrap_or("default");
                let container_name = parameters
                    .get("container_name")
                    .and_then(Value::as_str)
                    .unwrap_or("default");
                let subnets = parameters.get("subnets").cloned().unwrap_or_else(|| json!([]));
                let security_groups = parameters.get("security_groups").cloned().unwrap_or_else(|| json!([]));
                let environment: Vec<Value> = operation
                    .config()
                    .environment_variables
                    .iter()
                    .collect::<BTreeMap<_, _>>()
                    .into_iter()
                    .map(|(name, value)| json!({"Name": name, "Value": value}))
                    .collect();

                State::Task(TaskState {
                    resource: "arn:aws:states:::ecs:runTask.sync".to_string(),
                    comment: Some(format!("Execute ECS operation: {}", operation.name())),
                    parameters: Some(json!({
                        "TaskDefinition": operation.config().resource_arn,
                        "Cluster": cluster,
                        "LaunchType": "FARGATE",
                        "NetworkConfiguration": {
                            "AwsvpcConfiguration": {
                                "AssignPublicIp": "ENABLED",
                                "Subnets": subnets,
                                "SecurityGroups": security_groups,
                            }
                        },
                        "Overrides": {
                            "ContainerOverrides": [{
                                "Name": container_name,
                                "Environment": environment,
                            }]
                        },
                    })),
                    result_path: Some(result_path),
                    timeout_seconds: Some(operation.config().timeout_seconds),
                    retry: self.retry_rules(operation),
                    catch: if top_level {
                        vec![CatchRule::all_to("PipelineFailure")]
                    } else {
                        Vec::new()
                    },
                    next,
                    end,
                })
            }
            other => State::Pass(PassState {
                comment: Some(format!(
                    "Placeholder for operation: {} (type: {})",
                    operation.name(),
                    other
                )),
                parameters: Some(json!({
                    "operation_id": operation.operation_id(),
                    "operation_type": other.to_string(),
                    "status": "skipped",
                    "message": "Operation type not implemented",
                })),
                result_path: Some(result_path),
                next,
                end,
            }),
        }
    }

    fn retry_rules(&self, operation: &Operation) -> Vec<RetryRule> {
        vec![RetryRule {
            error_equals: self.retryable_errors.clone(),
            interval_seconds: operation.config().retry_delay_seconds,
            max_attempts: operation.config().retry_count,
            backoff_rate: 2.0,
        }]
    }

    /// Produces the input envelope consumed by the compiled state machine.
    pub fn execution_input(
        &self,
        pipeline: &Pipeline,
        session_id: &str,
        parameters: Option<HashMap<String, Value>>,
    ) -> Value {
        json!({
            "pipeline_id": pipeline.pipeline_id(),
            "pipeline_name": pipeline.name(),
            "pipeline_version": pipeline.version().to_string(),
            "session_id": session_id,
            "parameters": sorted_object(&parameters.unwrap_or_default()),
            "started_at": "${currentTime}",
            "operation_results": {},
            "job_results": {},
        })
    }

    /// Structural validation of a definition: a non-empty comment, a
    /// `StartAt` naming a state, and every top-level `Next` resolving to an
    /// existing state.
    pub fn validate_state_machine(definition: &StateMachineDefinition) -> bool {
        if definition.comment.is_empty() {
            return false;
        }
        if !definition.states.contains_key(&definition.start_at) {
            return false;
        }
        definition
            .states
            .values()
            .filter_map(State::next)
            .all(|next| definition.states.contains_key(next))
    }
}

fn sorted_object(map: &HashMap<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn sorted_env(map: &HashMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunsui_domain::entities::OperationConfig;

    fn lambda_op(id: &str) -> Operation {
        Operation::lambda(id, id, format!("arn:aws:lambda:us-east-1:1:function:{}", id)).unwrap()
    }

    fn linear_pipeline() -> Pipeline {
        let mut p = Pipeline::with_id("P1", "linear").unwrap();
        let mut a = Job::new("A", "job A").unwrap();
        a.add_operation(lambda_op("op_a"));
        let mut b = Job::new("B", "job B").unwrap();
        b.add_dependency("A");
        b.add_operation(lambda_op("op_b"));
        let mut c = Job::new("C", "job C").unwrap();
        c.add_dependency("B");
        c.add_operation(lambda_op("op_c"));
        p.add_job(a).unwrap();
        p.add_job(b).unwrap();
        p.add_job(c).unwrap();
        p
    }

    #[test]
    fn test_compile_linear_pipeline() {
        let compiler = StateMachineCompiler::new();
        let compiled = compiler.compile(&linear_pipeline(), "arn:aws:iam::1:role/exec").unwrap();

        assert_eq!(compiled.name, "bunsui-P1-1.0.0");
        assert_eq!(compiled.description, "Pipeline: linear (v1.0.0)");
        assert_eq!(compiled.tags.get("pipeline"), Some(&"P1".to_string()));
        assert_eq!(compiled.tags.get("version"), Some(&"1.0.0".to_string()));

        let definition = &compiled.definition;
        assert_eq!(definition.start_at, "Job_A_Start");
        for name in [
            "Job_A_Start",
            "Job_A_Operations",
            "Operation_op_a",
            "Job_A_End",
            "Job_B_Start",
            "Job_B_Operations",
            "Operation_op_b",
            "Job_B_End",
            "Job_C_Start",
            "Job_C_Operations",
            "Operation_op_c",
            "Job_C_End",
            "PipelineSuccess",
            "PipelineFailure",
        ] {
            assert!(definition.states.contains_key(name), "missing state {}", name);
        }

        // Jobs chain in topological order, the last one into PipelineSuccess.
        assert_eq!(definition.states["Job_A_End"].next(), Some("Job_B_Start"));
        assert_eq!(definition.states["Job_B_End"].next(), Some("Job_C_Start"));
        assert_eq!(definition.states["Job_C_End"].next(), Some("PipelineSuccess"));

        assert!(StateMachineCompiler::validate_state_machine(definition));
    }

    #[test]
    fn test_compile_rejects_cycles() {
        let mut p = Pipeline::with_id("P2", "cyclic").unwrap();
        let mut a = Job::new("A", "a").unwrap();
        a.add_dependency("B");
        let mut b = Job::new("B", "b").unwrap();
        b.add_dependency("A");
        p.add_job(a).unwrap();
        p.add_job(b).unwrap();

        let err = StateMachineCompiler::new()
            .compile(&p, "arn:aws:iam::1:role/exec")
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_compile_empty_pipeline_starts_at_success() {
        let p = Pipeline::with_id("P3", "empty").unwrap();
        let compiled = StateMachineCompiler::new().compile(&p, "arn:aws:iam::1:role/exec").unwrap();
        assert_eq!(compiled.definition.start_at, "PipelineSuccess");
        assert!(StateMachineCompiler::validate_state_machine(&compiled.definition));
    }

    #[test]
    fn test_lambda_operation_state_shape() {
        let compiled = StateMachineCompiler::new()
            .compile(&linear_pipeline(), "arn:aws:iam::1:role/exec")
            .unwrap();
        let state = serde_json::to_value(&compiled.definition.states["Operation_op_a"]).unwrap();

        assert_eq!(state["Type"], "Task");
        assert_eq!(state["Resource"], "arn:aws:states:::lambda:invoke");
        assert_eq!(state["Parameters"]["Payload"]["job_id"], "A");
        assert_eq!(state["Parameters"]["Payload"]["pipeline_id.$"], "$.pipeline_id");
        assert_eq!(state["ResultPath"], "$.operation_results.op_a");
        assert_eq!(state["Retry"][0]["IntervalSeconds"], 60);
        assert_eq!(state["Retry"][0]["MaxAttempts"], 3);
        assert_eq!(state["Retry"][0]["BackoffRate"], 2.0);
        assert_eq!(state["Catch"][0]["Next"], "PipelineFailure");
        assert_eq!(state["Next"], "Job_A_End");
    }

    #[test]
    fn test_multi_operation_job_compiles_to_parallel() {
        let mut p = Pipeline::with_id("P4", "fanout").unwrap();
        let mut job = Job::new("A", "job A").unwrap();
        job.add_operation(lambda_op("op_1"));
        job.add_operation(lambda_op("op_2"));
        p.add_job(job).unwrap();

        let compiled = StateMachineCompiler::new().compile(&p, "arn:aws:iam::1:role/exec").unwrap();
        let operations = &compiled.definition.states["Job_A_Operations"];
        match operations {
            State::Parallel(parallel) => {
                assert_eq!(parallel.branches.len(), 2);
                assert_eq!(parallel.catch[0].next, "PipelineFailure");
                assert_eq!(parallel.next.as_deref(), Some("Job_A_End"));
                // Branch operation states terminate their branch.
                let branch = &parallel.branches[0];
                assert_eq!(branch.start_at, "Operation_op_1");
                match &branch.states["Operation_op_1"] {
                    State::Task(task) => {
                        assert_eq!(task.end, Some(true));
                        assert!(task.catch.is_empty());
                        assert!(!task.retry.is_empty());
                    }
                    other => panic!("expected task state, got {:?}", other),
                }
            }
            other => panic!("expected parallel state, got {:?}", other),
        }
    }

    #[test]
    fn test_ecs_operation_state_shape() {
        let mut p = Pipeline::with_id("P5", "containers").unwrap();
        let mut job = Job::new("A", "job A").unwrap();
        let mut op = Operation::ecs(
            "op_ecs",
            "transform",
            "arn:aws:ecs:us-east-1:1:task-definition/transform:1",
            "analytics",
        )
        .unwrap();
        let mut config = op.config().clone();
        config
            .environment_variables
            .insert("STAGE".to_string(), "prod".to_string());
        config
            .parameters
            .insert("subnets".to_string(), json!(["subnet-1"]));
        op.update_config(config);
        job.add_operation(op);
        p.add_job(job).unwrap();

        let compiled = StateMachineCompiler::new().compile(&p, "arn:aws:iam::1:role/exec").unwrap();
        let state = serde_json::to_value(&compiled.definition.states["Operation_op_ecs"]).unwrap();
        assert_eq!(state["Resource"], "arn:aws:states:::ecs:runTask.sync");
        assert_eq!(state["Parameters"]["Cluster"], "analytics");
        assert_eq!(state["Parameters"]["LaunchType"], "FARGATE");
        assert_eq!(
            state["Parameters"]["NetworkConfiguration"]["AwsvpcConfiguration"]["Subnets"][0],
            "subnet-1"
        );
        assert_eq!(
            state["Parameters"]["Overrides"]["ContainerOverrides"][0]["Environment"][0]["Name"],
            "STAGE"
        );
    }

    #[test]
    fn test_pass_through_operation_is_skipped() {
        let mut p = Pipeline::with_id("P6", "placeholder").unwrap();
        let mut job = Job::new("A", "job A").unwrap();
        job.add_operation(Operation::new("op_glue", "crawl", OperationConfig::new(OperationType::Glue)).unwrap());
        p.add_job(job).unwrap();

        let compiled = StateMachineCompiler::new().compile(&p, "arn:aws:iam::1:role/exec").unwrap();
        let state = serde_json::to_value(&compiled.definition.states["Operation_op_glue"]).unwrap();
        assert_eq!(state["Type"], "Pass");
        assert_eq!(state["Parameters"]["status"], "skipped");
        assert_eq!(state["Parameters"]["operation_type"], "glue");
    }

    #[test]
    fn test_validate_state_machine_catches_dangling_next() {
        let mut compiled = StateMachineCompiler::new()
            .compile(&linear_pipeline(), "arn:aws:iam::1:role/exec")
            .unwrap();
        assert!(StateMachineCompiler::validate_state_machine(&compiled.definition));

        compiled
            .definition
            .states
            .get_mut("Job_C_End")
            .unwrap()
            .set_next("Nowhere");
        assert!(!StateMachineCompiler::validate_state_machine(&compiled.definition));

        compiled.definition.start_at = "Missing".to_string();
        assert!(!StateMachineCompiler::validate_state_machine(&compiled.definition));
    }

    #[test]
    fn test_execution_input_envelope() {
        let pipeline = linear_pipeline();
        let mut parameters = HashMap::new();
        parameters.insert("target_date".to_string(), json!("2024-01-15"));
        let input = StateMachineCompiler::new().execution_input(&pipeline, "S1", Some(parameters));

        assert_eq!(input["pipeline_id"], "P1");
        assert_eq!(input["pipeline_name"], "linear");
        assert_eq!(input["pipeline_version"], "1.0.0");
        assert_eq!(input["session_id"], "S1");
        assert_eq!(input["parameters"]["target_date"], "2024-01-15");
        assert_eq!(input["operation_results"], json!({}));
        assert_eq!(input["job_results"], json!({}));
    }

    #[test]
    fn test_custom_retryable_errors() {
        let compiler = StateMachineCompiler::new().with_retryable_errors(vec!["States.Timeout".to_string()]);
        let compiled = compiler.compile(&linear_pipeline(), "arn:aws:iam::1:role/exec").unwrap();
        let state = serde_json::to_value(&compiled.definition.states["Operation_op_a"]).unwrap();
        assert_eq!(state["Retry"][0]["ErrorEquals"], json!(["States.Timeout"]));
    }
}
