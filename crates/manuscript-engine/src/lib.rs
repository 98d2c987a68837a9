//! Pipeline compiler and orchestrator for Manuscript.
//!
//! Turns a validated pipeline document into streaming SQL statements,
//! provisions sink destinations and submits the resulting jobs.

pub mod compile;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod graph;
pub mod orchestrator;
pub mod result;
pub mod runtime;
pub mod settings;
pub mod sink;
pub mod sql;
pub mod type_map;

// Re-export public API for convenience
pub use context::{CompileContext, CompiledStatement, StatementKind};
pub use error::{PipelineError, Stage};
pub use execution::{ExecutionOptions, PipelineOutcome};
pub use orchestrator::{check_pipeline, run_pipeline};
pub use result::{CheckResult, ExecutionReport, PlanReport};
pub use runtime::{JobHandle, JobId, JobState, RuntimeError, SqlGatewayRuntime, TableRuntime};
pub use settings::{EngineSettings, FunctionDef};
pub use sink::{PgAdmin, PostgresAdmin};
