use anyhow::{Context, Result};

use manuscript_engine::check_pipeline;
use manuscript_engine::config::load_pipeline;

/// Execute the `check` command: validate, render and resolve dependencies
/// without contacting the runtime or any destination.
pub async fn execute(location: &str) -> Result<()> {
    let spec = load_pipeline(location)
        .await
        .with_context(|| format!("Failed to load pipeline: {location}"))?;
    println!("Pipeline structure: OK");

    let result = check_pipeline(spec).context("Pipeline check failed")?;

    println!("Pipeline:          {}", result.pipeline);
    println!(
        "Entities:          {} source(s), {} transform(s), {} sink(s)",
        result.sources, result.transforms, result.sinks
    );
    println!("Compile order:     {}", result.compile_order.join(" -> "));
    for (name, deps) in &result.dependencies {
        println!("  {name:18} <- {}", deps.join(", "));
    }
    println!("\nAll checks passed.");
    Ok(())
}
