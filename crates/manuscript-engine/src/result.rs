//! Pipeline run result types.

use serde::Serialize;

use crate::context::CompiledStatement;
use crate::runtime::{JobId, JobState};

/// Result of a pipeline run that submitted its jobs.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub pipeline: String,
    pub statements: Vec<CompiledStatement>,
    /// Accepted jobs, in sink declaration order.
    pub jobs: Vec<JobId>,
    pub state: JobState,
    pub compile_secs: f64,
    pub duration_secs: f64,
}

/// Compiled plan of a dry run. Nothing was submitted.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub pipeline: String,
    pub statements: Vec<CompiledStatement>,
    pub duration_secs: f64,
}

/// Result of a static pipeline check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub pipeline: String,
    pub sources: usize,
    pub transforms: usize,
    pub sinks: usize,
    /// Entity names in compile order.
    pub compile_order: Vec<String>,
    /// Each transform and sink with the views it reads from.
    pub dependencies: Vec<(String, Vec<String>)>,
}
