//! Per-run compile state threaded through every stage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use manuscript_types::Column;
use serde::Serialize;

use crate::error::{PipelineError, Stage};
use crate::runtime::{RuntimeError, TableRuntime};
use crate::settings::EngineSettings;
use crate::sql::{quote_ident, redact};

/// What a compiled statement creates or changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    SessionConfig,
    Catalog,
    Function,
    SourceView,
    IntermediateView,
    TransformView,
    SinkTable,
    Insert,
}

/// A statement sent (or, for inserts, to be submitted) to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledStatement {
    pub stage: Stage,
    pub kind: StatementKind,
    /// Entity the statement belongs to.
    pub target: String,
    pub sql: String,
}

/// Append-only view name to schema mapping.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    order: Vec<String>,
    schemas: HashMap<String, Vec<Column>>,
}

impl ViewRegistry {
    /// Record the resolved schema of a new view.
    ///
    /// # Errors
    ///
    /// Returns a config error if the name is already registered.
    pub fn register(&mut self, name: &str, columns: Vec<Column>) -> Result<(), PipelineError> {
        if self.schemas.contains_key(name) {
            return Err(PipelineError::config(format!(
                "view '{name}' is already registered"
            )));
        }
        self.order.push(name.to_string());
        self.schemas.insert(name.to_string(), columns);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[Column]> {
        self.schemas.get(name).map(Vec::as_slice)
    }

    /// Registered view names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Runtime handle, view registry, statement plan and clock for one run.
pub struct CompileContext {
    runtime: Arc<dyn TableRuntime>,
    settings: EngineSettings,
    registry: ViewRegistry,
    plan: Vec<CompiledStatement>,
    now: DateTime<Utc>,
}

impl CompileContext {
    pub fn new(runtime: Arc<dyn TableRuntime>, settings: EngineSettings) -> Self {
        Self::with_clock(runtime, settings, Utc::now())
    }

    /// Context with a fixed "now" for scan-mode resolution.
    pub fn with_clock(
        runtime: Arc<dyn TableRuntime>,
        settings: EngineSettings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            runtime,
            settings,
            registry: ViewRegistry::default(),
            plan: Vec::new(),
            now,
        }
    }

    #[must_use]
    pub fn runtime(&self) -> Arc<dyn TableRuntime> {
        Arc::clone(&self.runtime)
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[must_use]
    pub fn plan(&self) -> &[CompiledStatement] {
        &self.plan
    }

    pub fn into_plan(self) -> Vec<CompiledStatement> {
        self.plan
    }

    /// Record a statement that is not executed during compilation.
    pub fn record(&mut self, stage: Stage, kind: StatementKind, target: &str, sql: String) {
        self.plan.push(CompiledStatement {
            stage,
            kind,
            target: target.to_string(),
            sql,
        });
    }

    /// Execute a statement on the runtime and record it in the plan.
    /// Secret option values are masked in the plan, logs and errors.
    ///
    /// # Errors
    ///
    /// A runtime rejection becomes a provisioning error in the sink stage
    /// and a compile error elsewhere.
    pub async fn issue(
        &mut self,
        stage: Stage,
        kind: StatementKind,
        target: &str,
        sql: String,
    ) -> Result<(), PipelineError> {
        let logged = redact(&sql);
        tracing::debug!(%stage, entity = target, statement = %logged, "Executing statement");
        if let Err(e) = self.runtime.execute_statement(&sql).await {
            return Err(rejected(stage, target, logged, &e));
        }
        self.record(stage, kind, target, logged);
        Ok(())
    }

    /// Resolve the schema of a view the runtime already knows.
    ///
    /// # Errors
    ///
    /// Returns a compile error carrying the `DESCRIBE` statement.
    pub async fn describe(
        &self,
        stage: Stage,
        target: &str,
        view: &str,
    ) -> Result<Vec<Column>, PipelineError> {
        self.runtime.describe(view).await.map_err(|e| {
            rejected(stage, target, format!("DESCRIBE {}", quote_ident(view)), &e)
        })
    }

    /// Register a resolved view schema.
    ///
    /// # Errors
    ///
    /// Returns a config error if the view is already registered.
    pub fn register(&mut self, name: &str, columns: Vec<Column>) -> Result<(), PipelineError> {
        tracing::debug!(view = name, columns = columns.len(), "Registered view");
        self.registry.register(name, columns)
    }

    /// Schema of a registered view.
    ///
    /// # Errors
    ///
    /// Returns a config error if the view was never registered.
    pub fn schema(&self, name: &str) -> Result<&[Column], PipelineError> {
        self.registry
            .get(name)
            .ok_or_else(|| PipelineError::config(format!("unknown view '{name}'")))
    }
}

fn rejected(stage: Stage, target: &str, statement: String, err: &RuntimeError) -> PipelineError {
    match stage {
        Stage::Sink => PipelineError::Provisioning {
            sink: target.to_string(),
            statement: Some(statement),
            message: err.to_string(),
        },
        _ => PipelineError::Compile {
            stage,
            target: target.to_string(),
            statement,
            message: err.to_string(),
        },
    }
}
