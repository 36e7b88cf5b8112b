//! row-guard command line interface
//!
//! Validates one local file against a local rule document using in-memory
//! collaborators, then writes the result workbook and JSON next to each other
//! in the output directory and prints the run summary as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use row_guard::config::PipelineConfig;
use row_guard::events::EventFeed;
use row_guard::logging::setup::{init_logging, LoggingConfig};
use row_guard::logging::{truncate_field, LogConfig};
use row_guard::pipeline::{PipelineContext, ValidationPipeline};
use row_guard::repository::{InMemoryAuditStore, InMemoryRulesStore};
use row_guard::storage::{BlobStore, ObjectStoreBlobStore};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

const RULES_REF: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "row-guard", version, about = "Validate the rows of a spreadsheet or CSV file")]
struct Args {
    /// Spreadsheet or delimited text file to validate
    #[arg(long)]
    input: PathBuf,

    /// JSON rule document
    #[arg(long)]
    rules: PathBuf,

    /// Directory receiving the result artifacts
    #[arg(long)]
    out: PathBuf,

    /// Rows per chunk (defaults to ROW_GUARD_CHUNK_SIZE or 5000)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Chunks validated concurrently (defaults to ROW_GUARD_WORKERS or 4)
    #[arg(long)]
    workers: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Debug logging, including per-chunk detail
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let logging = if args.verbose {
        LoggingConfig::development()
    } else {
        LoggingConfig::default()
    };
    if let Err(e) = init_logging(logging.with_json_format(args.json_logs)) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    }
}

/// Returns whether every row passed.
async fn run(args: Args) -> Result<bool> {
    let mut config = PipelineConfig::from_env().context("reading ROW_GUARD_* settings")?;
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let max_field_length = log_config.max_field_length;
    let config = config.with_log_config(log_config.clone());

    let input = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;
    let rules_text = tokio::fs::read_to_string(&args.rules)
        .await
        .with_context(|| format!("reading {}", args.rules.display()))?;
    let rules: serde_json::Value = serde_json::from_str(&rules_text)
        .with_context(|| format!("parsing {}", args.rules.display()))?;
    let file_name = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .context("input path has no file name")?
        .to_string();

    let blobs = Arc::new(ObjectStoreBlobStore::in_memory(config.bucket.clone()).with_log_config(log_config));
    let audits = Arc::new(InMemoryAuditStore::new());
    let feed = Arc::new(EventFeed::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            let _ = shutdown_tx.send(true);
        }
    });

    let context = PipelineContext::new(
        blobs.clone(),
        audits.clone(),
        Arc::new(InMemoryRulesStore::with_rules(RULES_REF, rules)),
        feed.clone(),
        config.clone(),
    )
    .with_shutdown(shutdown_rx);
    let pipeline = ValidationPipeline::new(context)?;

    let outcome = pipeline.ingest(&file_name, input, None, RULES_REF).await;

    for run_id in audits.run_ids().await {
        let mut events = feed.subscribe(&run_id).await;
        while let Some(line) = events.next().await {
            info!(run_id = %run_id, event = %truncate_field(&line, max_field_length), "Run event");
        }
    }

    let summary = outcome?;

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("creating {}", args.out.display()))?;
    for key in [&summary.spreadsheet_key, &summary.json_key].into_iter().flatten() {
        let blob = blobs.fetch(&config.bucket, key).await?;
        let path = artifact_path(&args.out, key);
        tokio::fs::write(&path, &blob.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Artifact written");
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.failure_count == 0)
}

fn artifact_path(out: &Path, key: &str) -> PathBuf {
    out.join(key.rsplit('/').next().unwrap_or(key))
}
