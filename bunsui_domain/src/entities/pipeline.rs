// /////////////////////////////////////////////////////////////////////////////
// Bunsui RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Entity
//!
//! The `Pipeline` entity is the root of the execution domain: a versioned,
//! acyclic DAG of [`Job`]s. It owns its jobs by value; jobs refer to each
//! other only by id, so loading a pipeline never materializes a cyclic object
//! graph.
//!
//! ## Overview
//!
//! Beyond plain entity state, the pipeline carries the DAG engine the rest of
//! the system is built on:
//!
//! - [`Pipeline::validate_dependencies`] checks that every declared
//!   dependency resolves to a job in the same pipeline
//! - [`Pipeline::detect_cycles`] runs a depth-first search with an explicit
//!   recursion stack and reports every cycle it finds
//! - [`Pipeline::execution_order`] produces a Kahn-style topological order,
//!   failing with a Validation error when the graph is invalid or cyclic
//! - [`Pipeline::ready_jobs`] answers readiness queries during execution
//!
//! Ordering is deterministic: when several jobs are ready in the same wave,
//! they are emitted in the order they appear in the pipeline's job list.
//!
//! ## Identity
//!
//! A pipeline is identified by `(pipeline_id, version)`. Update operations
//! never mutate a stored revision in place; they bump the version's patch
//! segment (see [`PipelineVersion`]) and write a new row.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::entities::{Job, JobStatus};
use crate::services::datetime_serde;
use crate::value_objects::PipelineVersion;
use crate::BunsuiError;

/// Publication status of a pipeline definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Draft,
    Active,
    Inactive,
    Deprecated,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Draft => write!(f, "draft"),
            PipelineStatus::Active => write!(f, "active"),
            PipelineStatus::Inactive => write!(f, "inactive"),
            PipelineStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = BunsuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(PipelineStatus::Draft),
            "active" => Ok(PipelineStatus::Active),
            "inactive" => Ok(PipelineStatus::Inactive),
            "deprecated" => Ok(PipelineStatus::Deprecated),
            _ => Err(BunsuiError::validation(format!("Unknown pipeline status: {}", s))),
        }
    }
}

/// Aggregated job counters for a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub running_jobs: usize,
    pub pending_jobs: usize,
    pub completion_percentage: f64,
}

/// A versioned, acyclic DAG of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    // Identity fields (always first)
    pipeline_id: String,
    version: PipelineVersion,
    name: String,

    // Core business fields
    description: Option<String>,
    jobs: Vec<Job>,
    status: PipelineStatus,
    timeout_seconds: u32,
    max_concurrent_jobs: u32,

    // User context
    user_id: Option<String>,
    user_name: Option<String>,

    // Metadata fields (always last)
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    #[serde(with = "datetime_serde")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "datetime_serde")]
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl Pipeline {
    /// Creates a draft pipeline with a generated id and version `1.0.0`.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `name` is empty
    pub fn new(name: impl Into<String>) -> Result<Self, BunsuiError> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name)
    }

    /// Creates a draft pipeline with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// * `Validation` - if `pipeline_id` or `name` is empty
    pub fn with_id(pipeline_id: impl Into<String>, name: impl Into<String>) -> Result<Self, BunsuiError> {
        let pipeline_id = pipeline_id.into();
        let name = name.into();
        if pipeline_id.is_empty() {
            return Err(BunsuiError::validation("Pipeline id cannot be empty"));
        }
        if name.is_empty() {
            return Err(BunsuiError::validation("Pipeline name cannot be empty"));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            pipeline_id,
            version: PipelineVersion::default(),
            name,
            description: None,
            jobs: Vec::new(),
            status: PipelineStatus::Draft,
            timeout_seconds: 3600,
            max_concurrent_jobs: 10,
            user_id: None,
            user_name: None,
            tags: HashMap::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn version(&self) -> &PipelineVersion {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    pub fn max_concurrent_jobs(&self) -> u32 {
        self.max_concurrent_jobs
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.created_at
    }

    pub fn updated_at(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.updated_at
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u32) {
        self.timeout_seconds = timeout_seconds;
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_max_concurrent_jobs(&mut self, max_concurrent_jobs: u32) {
        self.max_concurrent_jobs = max_concurrent_jobs;
        self.updated_at = chrono::Utc::now();
    }

    pub fn set_user(&mut self, user_id: Option<String>, user_name: Option<String>) {
        self.user_id = user_id;
        self.user_name = user_name;
        self.updated_at = chrono::Utc::now();
    }

    /// Replaces the version. Used by repositories when bumping on update.
    pub fn set_version(&mut self, version: PipelineVersion) {
        self.version = version;
        self.updated_at = chrono::Utc::now();
    }

    /// Adds a job to the pipeline.
    ///
    /// # Errors
    ///
    /// * `Validation` - if a job with the same id already exists
    pub fn add_job(&mut self, job: Job) -> Result<(), BunsuiError> {
        if self.get_job(job.job_id()).is_some() {
            return Err(BunsuiError::validation(format!(
                "Duplicate job id: {}",
                job.job_id()
            )));
        }
        self.jobs.push(job);
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Removes a job by id. Returns whether one was removed.
    pub fn remove_job(&mut self, job_id: &str) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.job_id() != job_id);
        let removed = self.jobs.len() != before;
        if removed {
            self.updated_at = chrono::Utc::now();
        }
        removed
    }

    pub fn get_job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.job_id() == job_id)
    }

    pub fn get_job_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.job_id() == job_id)
    }

    pub fn get_job_by_name(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name() == name)
    }

    /// Checks that every declared dependency resolves to a job id in this
    /// pipeline.
    pub fn validate_dependencies(&self) -> bool {
        let job_ids: HashSet<&str> = self.jobs.iter().map(|j| j.job_id()).collect();
        self.jobs
            .iter()
            .all(|job| job.dependencies().iter().all(|dep| job_ids.contains(dep.as_str())))
    }

    /// Finds dependency cycles via DFS with an explicit recursion stack.
    ///
    /// Returns one entry per discovered cycle; each entry is the cycle path
    /// closed on its first node (`["a", "b", "a"]`). An acyclic graph yields
    /// an empty list.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut rec_stack: HashSet<String> = HashSet::new();

        for job in &self.jobs {
            if !visited.contains(job.job_id()) {
                self.cycle_dfs(job.job_id(), &mut Vec::new(), &mut visited, &mut rec_stack, &mut cycles);
            }
        }

        cycles
    }

    fn cycle_dfs(
        &self,
        job_id: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if rec_stack.contains(job_id) {
            if let Some(start) = path.iter().position(|p| p == job_id) {
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(job_id.to_string());
                cycles.push(cycle);
            }
            return;
        }

        if visited.contains(job_id) {
            return;
        }

        visited.insert(job_id.to_string());
        rec_stack.insert(job_id.to_string());
        path.push(job_id.to_string());

        if let Some(job) = self.get_job(job_id) {
            for dep in job.dependencies() {
                self.cycle_dfs(dep, path, visited, rec_stack, cycles);
            }
        }

        path.pop();
        rec_stack.remove(job_id);
    }

    /// Computes a topological execution order over the job ids.
    ///
    /// A job is emitted once all of its dependencies have been emitted; ties
    /// within a wave are broken by declaration order, so the result is
    /// deterministic for a given pipeline.
    ///
    /// # Errors
    ///
    /// * `Validation` - if a dependency does not resolve, or if the graph is
    ///   cyclic (the message names the cycles)
    pub fn execution_order(&self) -> Result<Vec<String>, BunsuiError> {
        if !self.validate_dependencies() {
            return Err(BunsuiError::validation(
                "Pipeline has dependencies that do not resolve to jobs in the pipeline",
            ));
        }

        let cycles = self.detect_cycles();
        if !cycles.is_empty() {
            return Err(BunsuiError::validation(format!(
                "Circular dependencies detected: {:?}",
                cycles
            )));
        }

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut order: Vec<String> = Vec::with_capacity(self.jobs.len());

        while order.len() < self.jobs.len() {
            let mut progressed = false;
            for job in &self.jobs {
                if !emitted.contains(job.job_id())
                    && job.dependencies().iter().all(|dep| emitted.contains(dep.as_str()))
                {
                    emitted.insert(job.job_id());
                    order.push(job.job_id().to_string());
                    progressed = true;
                }
            }
            // Unreachable once the cycle check passed; kept as a guard.
            if !progressed {
                return Err(BunsuiError::validation(
                    "Pipeline execution order did not converge",
                ));
            }
        }

        Ok(order)
    }

    /// Returns the pending jobs whose every dependency is in `completed`.
    pub fn ready_jobs(&self, completed: &HashSet<String>) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|job| job.status() == JobStatus::Pending && job.can_start(completed))
            .collect()
    }

    /// Aggregates per-status job counters.
    pub fn job_stats(&self) -> JobStats {
        let total_jobs = self.jobs.len();
        let count = |status: JobStatus| self.jobs.iter().filter(|j| j.status() == status).count();
        let completed_jobs = count(JobStatus::Completed);
        JobStats {
            total_jobs,
            completed_jobs,
            failed_jobs: count(JobStatus::Failed),
            running_jobs: count(JobStatus::Running),
            pending_jobs: count(JobStatus::Pending),
            completion_percentage: if total_jobs == 0 {
                0.0
            } else {
                completed_jobs as f64 / total_jobs as f64 * 100.0
            },
        }
    }

    /// Validates the whole definition: unique job and operation ids,
    /// resolvable dependencies, an acyclic graph, and valid operations.
    ///
    /// # Errors
    ///
    /// * `Validation` - with the first violation found
    pub fn validate(&self) -> Result<(), BunsuiError> {
        let mut job_ids: HashSet<&str> = HashSet::new();
        let mut op_ids: HashSet<&str> = HashSet::new();
        for job in &self.jobs {
            if !job_ids.insert(job.job_id()) {
                return Err(BunsuiError::validation(format!("Duplicate job id: {}", job.job_id())));
            }
            for op in job.operations() {
                if !op_ids.insert(op.operation_id()) {
                    return Err(BunsuiError::validation(format!(
                        "Duplicate operation id: {}",
                        op.operation_id()
                    )));
                }
                op.validate()?;
            }
        }

        if !self.validate_dependencies() {
            return Err(BunsuiError::validation(
                "Pipeline has dependencies that do not resolve to jobs in the pipeline",
            ));
        }

        let cycles = self.detect_cycles();
        if !cycles.is_empty() {
            return Err(BunsuiError::validation(format!(
                "Circular dependencies detected: {:?}",
                cycles
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Operation;

    fn linear_pipeline() -> Pipeline {
        // a <- b <- c
        let mut p = Pipeline::with_id("P1", "linear").unwrap();
        let mut a = Job::new("a", "job a").unwrap();
        a.add_operation(Operation::lambda("op-a", "a", "arn:aws:lambda:us-east-1:1:function:a").unwrap());
        let mut b = Job::new("b", "job b").unwrap();
        b.add_dependency("a");
        b.add_operation(Operation::lambda("op-b", "b", "arn:aws:lambda:us-east-1:1:function:b").unwrap());
        let mut c = Job::new("c", "job c").unwrap();
        c.add_dependency("b");
        c.add_operation(Operation::lambda("op-c", "c", "arn:aws:lambda:us-east-1:1:function:c").unwrap());
        p.add_job(a).unwrap();
        p.add_job(b).unwrap();
        p.add_job(c).unwrap();
        p
    }

    #[test]
    fn test_execution_order_linear() {
        let p = linear_pipeline();
        assert!(p.validate_dependencies());
        assert!(p.detect_cycles().is_empty());
        assert_eq!(p.execution_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_execution_order_diamond_is_deterministic() {
        // a <- b, a <- c, (b, c) <- d; declaration order breaks the b/c tie.
        let mut p = Pipeline::with_id("P2", "diamond").unwrap();
        p.add_job(Job::new("a", "a").unwrap()).unwrap();
        let mut b = Job::new("b", "b").unwrap();
        b.add_dependency("a");
        let mut c = Job::new("c", "c").unwrap();
        c.add_dependency("a");
        let mut d = Job::new("d", "d").unwrap();
        d.add_dependency("b");
        d.add_dependency("c");
        p.add_job(b).unwrap();
        p.add_job(c).unwrap();
        p.add_job(d).unwrap();

        assert_eq!(p.execution_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_unresolved_dependency_fails() {
        let mut p = Pipeline::with_id("P3", "dangling").unwrap();
        let mut a = Job::new("a", "a").unwrap();
        a.add_dependency("ghost");
        p.add_job(a).unwrap();

        assert!(!p.validate_dependencies());
        let err = p.execution_order().unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_cycle_detection() {
        let mut p = Pipeline::with_id("P4", "cyclic").unwrap();
        let mut a = Job::new("a", "a").unwrap();
        a.add_dependency("b");
        let mut b = Job::new("b", "b").unwrap();
        b.add_dependency("a");
        p.add_job(a).unwrap();
        p.add_job(b).unwrap();

        let cycles = p.detect_cycles();
        assert!(!cycles.is_empty());
        let flattened: HashSet<String> = cycles.into_iter().flatten().collect();
        assert!(flattened.contains("a"));
        assert!(flattened.contains("b"));

        assert!(p.execution_order().is_err());
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_ready_jobs_matches_pending_with_satisfied_deps() {
        let mut p = linear_pipeline();
        let mut done = HashSet::new();

        let ready: Vec<&str> = p.ready_jobs(&done).iter().map(|j| j.job_id()).collect();
        assert_eq!(ready, vec!["a"]);

        done.insert("a".to_string());
        p.get_job_mut("a").unwrap().transition_to(JobStatus::Running).unwrap();
        p.get_job_mut("a").unwrap().transition_to(JobStatus::Completed).unwrap();

        let ready: Vec<&str> = p.ready_jobs(&done).iter().map(|j| j.job_id()).collect();
        assert_eq!(ready, vec!["b"]);
    }

    #[test]
    fn test_duplicate_job_id_rejected() {
        let mut p = Pipeline::with_id("P5", "dup").unwrap();
        p.add_job(Job::new("a", "a").unwrap()).unwrap();
        assert!(p.add_job(Job::new("a", "again").unwrap()).is_err());
    }

    #[test]
    fn test_job_stats() {
        let mut p = linear_pipeline();
        p.get_job_mut("a").unwrap().transition_to(JobStatus::Running).unwrap();
        p.get_job_mut("a").unwrap().transition_to(JobStatus::Completed).unwrap();
        p.get_job_mut("b").unwrap().transition_to(JobStatus::Running).unwrap();

        let stats = p.job_stats();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.running_jobs, 1);
        assert_eq!(stats.pending_jobs, 1);
        assert!((stats.completion_percentage - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_serde_round_trip() {
        let p = linear_pipeline();
        let json = serde_json::to_string(&p).unwrap();
        let back: Pipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_version_bump_on_set() {
        let mut p = linear_pipeline();
        let next = p.version().bumped();
        p.set_version(next.clone());
        assert_eq!(p.version(), &next);
        assert_eq!(p.version().as_str(), "1.0.1");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Random acyclic graphs: each job may depend only on
        /// earlier-indexed jobs, so the graph is acyclic by construction.
        fn acyclic_pipeline() -> impl Strategy<Value = Pipeline> {
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), 0..8), 1..8).prop_map(|rows| {
                let mut p = Pipeline::with_id("prop", "generated").unwrap();
                for (index, row) in rows.iter().enumerate() {
                    let mut job = Job::new(format!("j{}", index), format!("job {}", index)).unwrap();
                    for (dep, wanted) in row.iter().enumerate().take(index) {
                        if *wanted {
                            job.add_dependency(format!("j{}", dep));
                        }
                    }
                    p.add_job(job).unwrap();
                }
                p
            })
        }

        proptest! {
            #[test]
            fn execution_order_is_topological(p in acyclic_pipeline()) {
                prop_assert!(p.validate_dependencies());
                prop_assert!(p.detect_cycles().is_empty());

                let order = p.execution_order().unwrap();
                prop_assert_eq!(order.len(), p.jobs().len());

                let position: HashMap<&str, usize> =
                    order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
                for job in p.jobs() {
                    for dep in job.dependencies() {
                        prop_assert!(position[dep.as_str()] < position[job.job_id()]);
                    }
                }
            }

            #[test]
            fn ready_jobs_are_pending_with_satisfied_deps(p in acyclic_pipeline(), done_mask in any::<u8>()) {
                let done: HashSet<String> = p
                    .jobs()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| done_mask & (1u8 << (i % 8)) != 0)
                    .map(|(_, j)| j.job_id().to_string())
                    .collect();

                for job in p.ready_jobs(&done) {
                    prop_assert_eq!(job.status(), JobStatus::Pending);
                    prop_assert!(job.dependencies().iter().all(|d| done.contains(d)));
                }
            }
        }
    }
}
