//! DataMCP Ingest - batch ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datamcp_common::logging::{init_logging, LogConfig};
use datamcp_ingest::storage::object_client_from_env;
use datamcp_ingest::{
    BatchIngestionRunner, LocalStorageAdapter, ObjectStorageAdapter, PipelineConfig, RunStatus,
    StorageAdapter,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "datamcp-ingest")]
#[command(author, version, about = "Batch CSV ingestion between local disk and object storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline once
    Run {
        /// Pipeline document (YAML or JSON)
        #[arg(short, long, env = "DATAMCP_PIPELINE")]
        config: PathBuf,

        /// Re-ingest even if the destination exists
        #[arg(long)]
        overwrite: bool,

        /// Directory for staging files
        #[arg(long)]
        staging_dir: Option<PathBuf>,
    },

    /// List files under a prefix
    List {
        /// Storage backend
        #[arg(long = "type", value_enum, default_value_t = Backend::Local)]
        backend: Backend,

        /// Directory, file or `s3://bucket/prefix`
        prefix: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Local,
    S3,
}

/// Report written to stderr when a run fails
#[derive(Serialize)]
struct FailureReport<'a> {
    status: RunStatus,
    name: &'a str,
    error: String,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("datamcp-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // Ingestion must work without logging
    let guard = init_logging(&log_config).ok();

    let code = match cli.command {
        Command::Run {
            config,
            overwrite,
            staging_dir,
        } => run_pipeline(config, overwrite, staging_dir).await,
        Command::List { backend, prefix } => match list(backend, &prefix).await {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "List failed");
                eprintln!("Error: {:#}", e);
                1
            },
        },
    };

    drop(guard);
    process::exit(code);
}

async fn run_pipeline(path: PathBuf, overwrite: bool, staging_dir: Option<PathBuf>) -> i32 {
    let mut config = match PipelineConfig::load(&path) {
        Ok(config) => config,
        Err(e) => return report_failure(&path.display().to_string(), &e),
    };
    if overwrite {
        config.options.overwrite = true;
    }
    if staging_dir.is_some() {
        config.options.staging_dir = staging_dir;
    }
    let name = config.name.clone();

    let runner = match BatchIngestionRunner::connect(config).await {
        Ok(runner) => runner,
        Err(e) => return report_failure(&name, &e),
    };

    match runner.run_once().await {
        Ok(result) => match serde_json::to_string(&result) {
            Ok(json) => {
                info!(status = ?result.status, dest = %result.dest, "Run finished");
                println!("{json}");
                0
            },
            Err(e) => report_failure(&name, &e),
        },
        Err(e) => report_failure(&name, &e),
    }
}

fn report_failure(name: &str, err: &dyn std::fmt::Display) -> i32 {
    error!(error = %err, "Pipeline {} failed", name);
    let report = FailureReport {
        status: RunStatus::Failed,
        name,
        error: err.to_string(),
    };
    match serde_json::to_string(&report) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("Error: {}", err),
    }
    1
}

async fn list(backend: Backend, prefix: &str) -> Result<()> {
    let adapter: Box<dyn StorageAdapter> = match backend {
        Backend::Local => Box::new(LocalStorageAdapter::new()),
        Backend::S3 => {
            let client = object_client_from_env().await?;
            Box::new(ObjectStorageAdapter::new(client))
        },
    };

    let paths = adapter
        .list(prefix)
        .await
        .with_context(|| format!("Failed to list {prefix}"))?;
    for path in &paths {
        println!("{path}");
    }
    info!(count = paths.len(), "Listed {}", prefix);
    Ok(())
}
