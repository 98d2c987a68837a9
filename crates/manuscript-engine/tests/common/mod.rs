//! In-memory collaborators for orchestrator tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use manuscript_engine::runtime::{JobHandle, JobId, JobState, RuntimeError, TableRuntime};
use manuscript_engine::PostgresAdmin;
use manuscript_types::spec::PostgresSink;
use manuscript_types::Column;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/pipelines")
        .join(name)
}

/// Build columns from `(name, runtime type string)` pairs.
pub fn columns(pairs: &[(&str, &str)]) -> Vec<Column> {
    pairs
        .iter()
        .map(|(name, ty)| Column::from_type_string(*name, ty).unwrap())
        .collect()
}

#[derive(Default)]
struct RuntimeState {
    statements: Vec<String>,
    submitted: Vec<String>,
    executed: Vec<(String, Vec<JobId>)>,
}

/// A runtime that answers `DESCRIBE` from preset schemas and records
/// everything it is sent.
#[derive(Default)]
pub struct FakeRuntime {
    schemas: HashMap<String, Vec<Column>>,
    fail_statement: Option<String>,
    reject_acceptance: Option<String>,
    final_state: Option<JobState>,
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, view: &str, columns: Vec<Column>) -> Self {
        self.schemas.insert(view.to_string(), columns);
        self
    }

    /// Reject any statement containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_statement = Some(needle.to_string());
        self
    }

    /// Never accept the insert containing `needle`.
    pub fn rejecting_job(mut self, needle: &str) -> Self {
        self.reject_acceptance = Some(needle.to_string());
        self
    }

    pub fn ending_in(mut self, state: JobState) -> Self {
        self.final_state = Some(state);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn executed(&self) -> Vec<(String, Vec<JobId>)> {
        self.state.lock().unwrap().executed.clone()
    }
}

#[async_trait]
impl TableRuntime for FakeRuntime {
    async fn execute_statement(&self, sql: &str) -> Result<(), RuntimeError> {
        if let Some(needle) = &self.fail_statement {
            if sql.contains(needle.as_str()) {
                return Err(RuntimeError::Rejected(format!("rejected: {needle}")));
            }
        }
        self.state.lock().unwrap().statements.push(sql.to_string());
        Ok(())
    }

    async fn describe(&self, name: &str) -> Result<Vec<Column>, RuntimeError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Rejected(format!("Object '{name}' not found")))
    }

    async fn submit_insert(&self, sql: &str) -> Result<JobHandle, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(sql.to_string());
        Ok(JobHandle {
            operation: format!("op-{}", state.submitted.len()),
            statement: sql.to_string(),
        })
    }

    async fn await_accepted(&self, handle: JobHandle) -> Result<JobId, RuntimeError> {
        if let Some(needle) = &self.reject_acceptance {
            if handle.statement.contains(needle.as_str()) {
                return Err(RuntimeError::Rejected("job submission failed".to_string()));
            }
        }
        Ok(JobId(format!("job-{}", handle.operation)))
    }

    async fn execute(&self, pipeline: &str, jobs: &[JobId]) -> Result<JobState, RuntimeError> {
        self.state
            .lock()
            .unwrap()
            .executed
            .push((pipeline.to_string(), jobs.to_vec()));
        Ok(self.final_state.clone().unwrap_or(JobState::Finished))
    }
}

#[derive(Default)]
struct AdminState {
    databases: BTreeSet<String>,
    objects: BTreeSet<String>,
    create_database_calls: usize,
    statements: Vec<String>,
}

/// An idempotent in-memory PostgreSQL server.
#[derive(Default)]
pub struct FakeAdmin {
    state: Mutex<AdminState>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn databases(&self) -> Vec<String> {
        self.state.lock().unwrap().databases.iter().cloned().collect()
    }

    pub fn objects(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.iter().cloned().collect()
    }

    pub fn create_database_calls(&self) -> usize {
        self.state.lock().unwrap().create_database_calls
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }
}

#[async_trait]
impl PostgresAdmin for FakeAdmin {
    async fn database_exists(&self, _conn: &PostgresSink, database: &str) -> Result<bool, String> {
        Ok(self.state.lock().unwrap().databases.contains(database))
    }

    async fn create_database(&self, _conn: &PostgresSink, database: &str) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.create_database_calls += 1;
        state.databases.insert(database.to_string());
        Ok(())
    }

    async fn execute_in(&self, _conn: &PostgresSink, database: &str, sql: &str) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if !state.databases.contains(database) {
            return Err(format!("database \"{database}\" does not exist"));
        }
        state.statements.push(sql.to_string());
        state.objects.insert(format!("{database}:{sql}"));
        Ok(())
    }
}
