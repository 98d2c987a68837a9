//! Execution mode types for pipeline runs.

use crate::result::{ExecutionReport, PlanReport};

/// Runtime execution options (not part of the pipeline document).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Compile every statement but skip relational provisioning and job
    /// submission.
    pub dry_run: bool,
}

/// Either a submitted run or a dry-run plan.
#[derive(Debug)]
pub enum PipelineOutcome {
    Run(ExecutionReport),
    DryRun(PlanReport),
}
