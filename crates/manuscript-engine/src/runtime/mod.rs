//! Streaming runtime collaborator.
//!
//! The compiler only talks to the runtime through [`TableRuntime`]:
//! statements are sent one at a time, view schemas are read back with
//! `DESCRIBE`, and inserts are submitted as jobs.

pub mod gateway;

use std::fmt;

use async_trait::async_trait;
use manuscript_types::{Column, SchemaError};

pub use gateway::SqlGatewayRuntime;

/// Transport or protocol failure talking to the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The runtime executed the statement and reported a failure.
    #[error("{0}")]
    Rejected(String),

    #[error("unexpected runtime response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Pending submission of one insert statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Runtime operation that carries the submission.
    pub operation: String,
    pub statement: String,
}

/// Identifier the runtime assigned to an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal state of a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Finished,
    Canceled,
    Failed { job: JobId, reason: String },
}

/// A continuous-computation runtime that accepts SQL statements.
#[async_trait]
pub trait TableRuntime: Send + Sync {
    /// Execute a DDL or `SET` statement and wait for it to complete.
    async fn execute_statement(&self, sql: &str) -> Result<(), RuntimeError>;

    /// Ordered column schema of a registered view or table.
    async fn describe(&self, name: &str) -> Result<Vec<Column>, RuntimeError>;

    /// Submit an insert without waiting for the job to be accepted.
    async fn submit_insert(&self, sql: &str) -> Result<JobHandle, RuntimeError>;

    /// Wait until a submitted insert is accepted as a job.
    async fn await_accepted(&self, handle: JobHandle) -> Result<JobId, RuntimeError>;

    /// Block until every job of the pipeline has finished, or any one has
    /// been canceled or failed.
    async fn execute(&self, pipeline: &str, jobs: &[JobId]) -> Result<JobState, RuntimeError>;
}
