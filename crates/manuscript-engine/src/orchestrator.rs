//! Pipeline orchestrator: session preparation, view compilation, sink
//! provisioning and job submission.

use std::sync::Arc;
use std::time::Instant;

use manuscript_types::{Column, LogicalType, PipelineSpec};
use tokio::task::JoinSet;

use crate::compile::{compile_source, compile_transform, render_transforms};
use crate::context::{CompileContext, StatementKind};
use crate::error::{PipelineError, Stage};
use crate::execution::{ExecutionOptions, PipelineOutcome};
use crate::graph::{DependencyGraph, Entity};
use crate::result::{CheckResult, ExecutionReport, PlanReport};
use crate::runtime::{JobId, JobState, TableRuntime};
use crate::settings::EngineSettings;
use crate::sink::{provision_sink, sink_layout, PostgresAdmin};
use crate::sql::{quote_ident, render_options, string_literal};

const CATALOG_TYPE: &str = "paimon";

/// A validated pipeline with its templates rendered and dependencies
/// resolved. Nothing has touched the runtime yet.
#[derive(Debug)]
pub struct PreparedPipeline {
    pub spec: PipelineSpec,
    /// Transform SQL after template rendering, by transform index.
    pub rendered: Vec<String>,
    pub graph: DependencyGraph,
}

/// Render every transform template and build the dependency graph.
///
/// # Errors
///
/// Returns a template error or a config error for a bad reference.
pub fn prepare(spec: PipelineSpec) -> Result<PreparedPipeline, PipelineError> {
    let rendered = render_transforms(&spec.transforms)?;
    let graph = DependencyGraph::build(&spec, &rendered)?;
    Ok(PreparedPipeline {
        spec,
        rendered,
        graph,
    })
}

/// Static checks only: rendering and dependency resolution.
///
/// # Errors
///
/// Returns the first template or reference error.
pub fn check_pipeline(spec: PipelineSpec) -> Result<CheckResult, PipelineError> {
    tracing::info!(pipeline = %spec.name, "Checking pipeline");
    let prepared = prepare(spec)?;
    let spec = &prepared.spec;

    let compile_order = prepared
        .graph
        .compile_order()
        .into_iter()
        .map(|entity| entity_name(spec, entity).to_string())
        .collect();
    let dependencies = spec
        .transforms
        .iter()
        .map(|t| t.name.as_str())
        .chain(spec.sinks.iter().map(|s| s.name.as_str()))
        .map(|name| {
            let deps = prepared
                .graph
                .dependencies(name)
                .into_iter()
                .map(str::to_string)
                .collect();
            (name.to_string(), deps)
        })
        .collect();

    Ok(CheckResult {
        pipeline: spec.name.clone(),
        sources: spec.sources.len(),
        transforms: spec.transforms.len(),
        sinks: spec.sinks.len(),
        compile_order,
        dependencies,
    })
}

fn entity_name(spec: &PipelineSpec, entity: Entity) -> &str {
    match entity {
        Entity::Source(i) => &spec.sources[i].name,
        Entity::Transform(i) => &spec.transforms[i].name,
        Entity::Sink(i) => &spec.sinks[i].name,
    }
}

/// `SET` statements configuring the runtime for this pipeline.
#[must_use]
pub fn session_settings(spec: &PipelineSpec) -> Vec<(&'static str, String)> {
    vec![
        ("table.local-time-zone", "UTC".to_string()),
        ("table.exec.sink.upsert-materialize", "NONE".to_string()),
        ("table.exec.sink.not-null-enforcer", "ERROR".to_string()),
        ("state.backend.type", "rocksdb".to_string()),
        ("state.backend.incremental", "true".to_string()),
        ("state.checkpoints.dir", spec.checkpoint_dir.clone()),
        ("state.savepoints.dir", spec.savepoint_dir.clone()),
        ("execution.checkpointing.interval", "60s".to_string()),
        ("execution.checkpointing.min-pause", "1s".to_string()),
        ("execution.checkpointing.timeout", "30 min".to_string()),
        ("execution.checkpointing.max-concurrent-checkpoints", "1".to_string()),
        (
            "execution.checkpointing.externalized-checkpoint-retention",
            "RETAIN_ON_CANCELLATION".to_string(),
        ),
        (
            "execution.checkpointing.tolerable-failed-checkpoints",
            i32::MAX.to_string(),
        ),
        ("parallelism.default", spec.parallelism.to_string()),
    ]
}

fn set_statement(key: &str, value: &str) -> String {
    format!("SET {} = {}", string_literal(key), string_literal(value))
}

/// `CREATE CATALOG` for the lakehouse catalog holding the source datasets.
#[must_use]
pub fn catalog_statement(settings: &EngineSettings) -> String {
    let options = [
        ("type", CATALOG_TYPE),
        ("warehouse", settings.warehouse.as_str()),
        ("table-default.merge-engine", "deduplicate"),
        ("table-default.changelog-producer", "input"),
        ("table-default.metastore.partitioned-table", "false"),
        ("table-default.lookup.cache-file-retention", "1 h"),
        ("table-default.lookup.cache-max-memory-size", "256 mb"),
        ("table-default.lookup.cache-max-disk-size", "10 gb"),
        ("table-default.log.scan.remove-normalize", "true"),
        ("table-default.changelog-producer.row-deduplicate", "false"),
        ("table-default.consumer.expiration-time", "24 h"),
        ("table-default.streaming-read-mode", "file"),
        ("table-default.snapshot.expire.limit", "10000"),
        ("table-default.snapshot.num-retained.max", "2000"),
        ("table.exec.state.ttl", "2h"),
    ];
    format!(
        "CREATE CATALOG IF NOT EXISTS {} WITH ({})",
        quote_ident(&settings.catalog),
        render_options(&options)
    )
}

async fn prepare_session(
    ctx: &mut CompileContext,
    spec: &PipelineSpec,
) -> Result<(), PipelineError> {
    tracing::info!(pipeline = %spec.name, "Preparing runtime session");
    for (key, value) in session_settings(spec) {
        ctx.issue(
            Stage::Session,
            StatementKind::SessionConfig,
            key,
            set_statement(key, &value),
        )
        .await?;
    }

    let catalog = ctx.settings().catalog.clone();
    let sql = catalog_statement(ctx.settings());
    ctx.issue(Stage::Session, StatementKind::Catalog, &catalog, sql)
        .await?;

    let functions = ctx.settings().functions.clone();
    for function in functions {
        let sql = format!(
            "CREATE TEMPORARY SYSTEM FUNCTION IF NOT EXISTS {} AS {}",
            quote_ident(&function.name),
            string_literal(&function.class)
        );
        ctx.issue(Stage::Session, StatementKind::Function, &function.name, sql)
            .await?;
    }
    Ok(())
}

/// `INSERT INTO <sink> SELECT ... FROM <view>`, serializing structured
/// columns to JSON text under their own names.
#[must_use]
pub fn insert_statement(sink: &str, from: &str, columns: &[Column]) -> String {
    let select = columns
        .iter()
        .map(|c| {
            let col = quote_ident(&c.name);
            match &c.data_type {
                LogicalType::Array { .. } => format!("ARRAY_TO_JSON({col}) AS {col}"),
                LogicalType::Row { .. } => format!("ROW_TO_JSON({col}) AS {col}"),
                _ => col,
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} SELECT {select} FROM {}",
        quote_ident(sink),
        quote_ident(from)
    )
}

/// An insert ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInsert {
    pub sink: String,
    pub sql: String,
}

/// Compile every view and sink in dependency order and produce one insert
/// per sink. The inserts are recorded in the plan but not submitted.
///
/// # Errors
///
/// Returns the first compile, type mapping or provisioning error.
pub async fn compile_pipeline(
    ctx: &mut CompileContext,
    admin: &dyn PostgresAdmin,
    prepared: &PreparedPipeline,
    dry_run: bool,
) -> Result<Vec<PendingInsert>, PipelineError> {
    let spec = &prepared.spec;
    prepare_session(ctx, spec).await?;

    let order = prepared.graph.compile_order();
    let mut sinks = Vec::with_capacity(spec.sinks.len());
    for entity in order {
        match entity {
            Entity::Source(i) => compile_source(ctx, &spec.sources[i]).await?,
            Entity::Transform(i) => {
                compile_transform(ctx, &spec.transforms[i], &prepared.rendered[i]).await?;
            }
            Entity::Sink(i) => sinks.push(&spec.sinks[i]),
        }
    }

    // Nothing reads from a sink, so every view exists by now. Map all sink
    // columns before the first destination is touched.
    let compiled: &CompileContext = ctx;
    let layouts = sinks
        .iter()
        .map(|sink| sink_layout(compiled, sink))
        .collect::<Result<Vec<_>, _>>()?;

    let mut inserts = Vec::with_capacity(sinks.len());
    for (sink, layout) in sinks.into_iter().zip(layouts) {
        provision_sink(ctx, admin, sink, layout, dry_run).await?;
        let sql = insert_statement(&sink.name, &sink.from, ctx.schema(&sink.name)?);
        ctx.record(Stage::Submit, StatementKind::Insert, &sink.name, sql.clone());
        inserts.push(PendingInsert {
            sink: sink.name.clone(),
            sql,
        });
    }

    tracing::info!(
        pipeline = %spec.name,
        views = ctx.registry().len(),
        inserts = inserts.len(),
        "Compiled pipeline"
    );
    Ok(inserts)
}

async fn collect_accepted_jobs(
    mut join_set: JoinSet<Result<(usize, JobId), PipelineError>>,
) -> Result<Vec<JobId>, PipelineError> {
    let mut accepted = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(job)) => accepted.push(job),
            // Dropping the set aborts the remaining waits; remote jobs keep running.
            Ok(Err(error)) => {
                tracing::error!(error = %error, "Job submission failed");
                return Err(error);
            }
            Err(join_err) => {
                return Err(PipelineError::Execution {
                    stage: Stage::Submit,
                    statement: None,
                    message: format!("submission task failed: {join_err}"),
                });
            }
        }
    }
    accepted.sort_by_key(|(index, _)| *index);
    Ok(accepted.into_iter().map(|(_, job)| job).collect())
}

/// Submit every insert, wait until all are accepted, then block until the
/// pipeline completes.
///
/// # Errors
///
/// Returns an execution error if a submission is rejected or a job fails.
pub async fn submit_and_execute(
    ctx: &mut CompileContext,
    pipeline: &str,
    inserts: &[PendingInsert],
) -> Result<(Vec<JobId>, JobState), PipelineError> {
    let runtime: Arc<dyn TableRuntime> = ctx.runtime();
    ctx.issue(
        Stage::Submit,
        StatementKind::SessionConfig,
        pipeline,
        set_statement("pipeline.name", pipeline),
    )
    .await?;

    let mut handles = Vec::with_capacity(inserts.len());
    for insert in inserts {
        let handle = runtime
            .submit_insert(&insert.sql)
            .await
            .map_err(|e| PipelineError::Execution {
                stage: Stage::Submit,
                statement: Some(insert.sql.clone()),
                message: e.to_string(),
            })?;
        tracing::info!(sink = %insert.sink, operation = %handle.operation, "Submitted insert");
        handles.push(handle);
    }

    let mut join_set = JoinSet::new();
    for (index, handle) in handles.into_iter().enumerate() {
        let runtime = Arc::clone(&runtime);
        join_set.spawn(async move {
            let statement = handle.statement.clone();
            runtime
                .await_accepted(handle)
                .await
                .map(|job| (index, job))
                .map_err(|e| PipelineError::Execution {
                    stage: Stage::Submit,
                    statement: Some(statement),
                    message: e.to_string(),
                })
        });
    }
    let jobs = collect_accepted_jobs(join_set).await?;
    tracing::info!(pipeline, jobs = jobs.len(), "All jobs accepted");

    let state = runtime
        .execute(pipeline, &jobs)
        .await
        .map_err(|e| PipelineError::Execution {
            stage: Stage::Execute,
            statement: None,
            message: e.to_string(),
        })?;
    match state {
        JobState::Failed { job, reason } => Err(PipelineError::Execution {
            stage: Stage::Execute,
            statement: None,
            message: format!("job {job} failed: {reason}"),
        }),
        state => Ok((jobs, state)),
    }
}

/// Run a full pipeline: compile, provision, submit and wait.
///
/// # Errors
///
/// Returns the first error of any stage; nothing is retried.
pub async fn run_pipeline(
    mut ctx: CompileContext,
    admin: &dyn PostgresAdmin,
    spec: PipelineSpec,
    options: &ExecutionOptions,
) -> Result<PipelineOutcome, PipelineError> {
    let start = Instant::now();
    let prepared = prepare(spec)?;
    let name = prepared.spec.name.clone();
    tracing::info!(pipeline = %name, dry_run = options.dry_run, "Starting pipeline");

    let inserts = compile_pipeline(&mut ctx, admin, &prepared, options.dry_run).await?;
    let compile_secs = start.elapsed().as_secs_f64();

    if options.dry_run {
        ctx.record(
            Stage::Submit,
            StatementKind::SessionConfig,
            &name,
            set_statement("pipeline.name", &name),
        );
        tracing::info!(pipeline = %name, statements = ctx.plan().len(), "Dry run complete");
        return Ok(PipelineOutcome::DryRun(PlanReport {
            pipeline: name,
            statements: ctx.into_plan(),
            duration_secs: start.elapsed().as_secs_f64(),
        }));
    }

    let (jobs, state) = submit_and_execute(&mut ctx, &name, &inserts).await?;
    tracing::info!(pipeline = %name, state = ?state, "Pipeline finished");
    Ok(PipelineOutcome::Run(ExecutionReport {
        pipeline: name,
        statements: ctx.into_plan(),
        jobs,
        state,
        compile_secs,
        duration_secs: start.elapsed().as_secs_f64(),
    }))
}
