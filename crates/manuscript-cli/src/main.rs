mod commands;
mod logging;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use manuscript_engine::settings::{
    DEFAULT_CATALOG, DEFAULT_GATEWAY_URL, DEFAULT_JOBMANAGER_URL, DEFAULT_SINK_ROOT,
    DEFAULT_WAREHOUSE,
};
use manuscript_engine::{EngineSettings, FunctionDef};

#[derive(Parser)]
#[command(
    name = "manuscript",
    version,
    about = "Compile pipeline documents to streaming SQL and run them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, provision and run a pipeline
    Run {
        /// Pipeline document: a path, file:// or http(s):// URL
        pipeline: String,
        /// Compile and print the statement plan without submitting jobs
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Validate a pipeline, render its templates and resolve dependencies
    Check {
        /// Pipeline document: a path, file:// or http(s):// URL
        pipeline: String,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// SQL gateway REST endpoint
    #[arg(long, env = "MANUSCRIPT_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,
    /// JobManager REST endpoint
    #[arg(long, env = "MANUSCRIPT_JOBMANAGER_URL", default_value = DEFAULT_JOBMANAGER_URL)]
    jobmanager_url: String,
    /// Catalog holding the source datasets
    #[arg(long, default_value = DEFAULT_CATALOG)]
    catalog: String,
    /// Catalog warehouse location
    #[arg(long, env = "MANUSCRIPT_WAREHOUSE", default_value = DEFAULT_WAREHOUSE)]
    warehouse: String,
    /// Root directory for filesystem sinks
    #[arg(long, env = "MANUSCRIPT_SINK_ROOT", default_value = DEFAULT_SINK_ROOT)]
    sink_root: String,
    /// Function to register before compiling, as NAME=CLASS (repeatable)
    #[arg(long = "function", value_parser = FunctionDef::parse)]
    functions: Vec<FunctionDef>,
    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
}

impl From<EngineArgs> for EngineSettings {
    fn from(args: EngineArgs) -> Self {
        Self {
            gateway_url: args.gateway_url,
            jobmanager_url: args.jobmanager_url,
            catalog: args.catalog,
            warehouse: args.warehouse,
            sink_root: args.sink_root,
            functions: args.functions,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            dry_run,
            engine,
        } => commands::run::execute(&pipeline, dry_run, engine.into()).await,
        Commands::Check { pipeline } => commands::check::execute(&pipeline).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_repeated_functions() {
        let cli = Cli::try_parse_from([
            "manuscript",
            "run",
            "pipeline.yaml",
            "--dry-run",
            "--function",
            "ADD=com.example.Add",
            "--function",
            "DECODE=com.example.Decode",
        ])
        .unwrap();
        let Commands::Run {
            pipeline,
            dry_run,
            engine,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(pipeline, "pipeline.yaml");
        assert!(dry_run);
        let settings = EngineSettings::from(engine);
        assert_eq!(settings.functions.len(), 2);
        assert_eq!(settings.functions[1].name, "DECODE");
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn malformed_function_is_rejected() {
        let result = Cli::try_parse_from(["manuscript", "run", "p.yaml", "--function", "ADD"]);
        assert!(result.is_err());
    }
}
