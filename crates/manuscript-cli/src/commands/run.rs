use std::sync::Arc;

use anyhow::{Context, Result};

use manuscript_engine::config::load_pipeline;
use manuscript_engine::{
    run_pipeline, CompileContext, EngineSettings, ExecutionOptions, ExecutionReport, PgAdmin,
    PipelineOutcome, SqlGatewayRuntime,
};

/// Execute the `run` command: load, compile, provision and submit a pipeline.
pub async fn execute(location: &str, dry_run: bool, settings: EngineSettings) -> Result<()> {
    let spec = load_pipeline(location)
        .await
        .with_context(|| format!("Failed to load pipeline: {location}"))?;

    let runtime = SqlGatewayRuntime::connect(&settings)
        .await
        .with_context(|| format!("Failed to open a session on {}", settings.gateway_url))?;
    let runtime = Arc::new(runtime);

    let ctx = CompileContext::new(runtime.clone(), settings);
    let options = ExecutionOptions { dry_run };
    let outcome = run_pipeline(ctx, &PgAdmin, spec, &options).await;

    if let Ok(runtime) = Arc::try_unwrap(runtime) {
        if let Err(e) = runtime.close().await {
            tracing::warn!(error = %e, "Failed to close runtime session");
        }
    }

    match outcome? {
        PipelineOutcome::Run(report) => print_report(&report),
        PipelineOutcome::DryRun(plan) => {
            let json = serde_json::to_string_pretty(&plan).context("Failed to encode plan")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn print_report(report: &ExecutionReport) {
    println!("Pipeline '{}' completed ({:?}).", report.pipeline, report.state);
    println!("  Statements:      {}", report.statements.len());
    println!("  Jobs:            {}", report.jobs.len());
    for job in &report.jobs {
        println!("    {job}");
    }
    println!("  Compile:         {:.2}s", report.compile_secs);
    println!("  Duration:        {:.2}s", report.duration_secs);
}
