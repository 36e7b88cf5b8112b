//! Chunked, batched, concurrent validation.
//!
//! Rows are split into contiguous chunks of at most `chunk_size` rows. Chunks
//! run in batches of at most `workers`: every chunk of a batch is validated on
//! a blocking worker thread, the whole batch is awaited, and its results are
//! merged back in row order before the next batch starts. Progress is reported
//! once per batch, so `processed` strictly increases.
//!
//! Cancellation and chunk failures raise a per-batch halt flag that the
//! remaining workers check between rows, so in-flight chunks stop after the
//! row they are on.

use super::validator::RowValidator;
use crate::core::{Row, ValidatedRow};
use crate::error::{GuardError, Result};
use crate::log_chunk;
use crate::logging::LogConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Default rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;
/// Default number of chunks validated concurrently.
pub const DEFAULT_WORKERS: usize = 4;

/// Percentage of `processed` over `total`, rounded to two decimals. Zero when
/// `total` is zero.
pub fn progress_percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Progress after a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub processed: usize,
    pub total: usize,
    pub percent: f64,
    /// 1-based batch number
    pub batch: usize,
    pub batches: usize,
}

impl ProgressUpdate {
    pub fn new(processed: usize, total: usize, batch: usize, batches: usize) -> Self {
        Self {
            processed,
            total,
            percent: progress_percent(processed, total),
            batch,
            batches,
        }
    }
}

/// Receives progress after every batch.
///
/// The scheduler awaits the observer before starting the next batch; an error
/// aborts the run.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn batch_completed(&self, update: ProgressUpdate) -> Result<()>;
}

/// Observer that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

#[async_trait]
impl ProgressObserver for NoopProgress {
    async fn batch_completed(&self, _update: ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_records: usize,
    pub processed_count: usize,
}

/// Validated rows in input order, plus their counts.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub rows: Vec<ValidatedRow>,
    pub stats: RunStats,
}

/// A contiguous run of rows validated by one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 1-based ordinal of the first row
    pub start_ordinal: usize,
    pub len: usize,
}

impl ChunkSpan {
    fn range(&self) -> std::ops::Range<usize> {
        self.start_ordinal - 1..self.start_ordinal - 1 + self.len
    }
}

/// Splits `total` rows into chunks of at most `chunk_size`.
pub fn partition(total: usize, chunk_size: usize) -> Vec<ChunkSpan> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(chunk_size)
        .map(|start| ChunkSpan {
            start_ordinal: start + 1,
            len: chunk_size.min(total - start),
        })
        .collect()
}

struct ChunkResult {
    start_ordinal: usize,
    rows: Vec<ValidatedRow>,
}

enum Next {
    Joined(Option<std::result::Result<ChunkResult, tokio::task::JoinError>>),
    Cancelled,
}

/// Runs a [`RowValidator`] over all rows with bounded concurrency.
///
/// # Examples
///
/// ```rust
/// use row_guard::rules::RuleDocument;
/// use row_guard::validation::{ChunkScheduler, NoopProgress, ValidationPlan};
/// use row_guard::core::{Row, Value};
/// use std::sync::Arc;
///
/// # async fn example() -> row_guard::error::Result<()> {
/// let compiled = RuleDocument::from_json(r#"{"columns": {"age": {"type": "int"}}}"#)?.compile()?;
/// let rows = vec![Row::from_pairs([("age", Some(Value::text("x")))])];
/// let plan = Arc::new(ValidationPlan::for_rows(compiled, &rows));
///
/// let outcome = ChunkScheduler::new(5000, 4)?
///     .run(Arc::new(rows), plan, &NoopProgress)
///     .await?;
/// assert_eq!(outcome.stats.failure_count, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChunkScheduler {
    chunk_size: usize,
    workers: usize,
    shutdown: Option<watch::Receiver<bool>>,
    log_config: LogConfig,
}

impl ChunkScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] when either size is zero.
    pub fn new(chunk_size: usize, workers: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(GuardError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if workers == 0 {
            return Err(GuardError::Configuration(
                "worker count must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            workers,
            shutdown: None,
            log_config: LogConfig::default(),
        })
    }

    /// Aborts the run when the channel carries `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Validates every row and returns the results in input order.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::PipelineAborted`] if a chunk panics, the observer
    /// fails, or shutdown is signalled. Remaining tasks of the batch are
    /// aborted and no partial output is returned.
    #[instrument(skip_all, fields(rows = rows.len(), chunk_size = self.chunk_size, workers = self.workers))]
    pub async fn run<V>(
        &self,
        rows: Arc<Vec<Row>>,
        validator: Arc<V>,
        observer: &dyn ProgressObserver,
    ) -> Result<ScheduleOutcome>
    where
        V: RowValidator + 'static,
    {
        let total = rows.len();
        let chunks = partition(total, self.chunk_size);
        let batches = chunks.len().div_ceil(self.workers);
        let mut shutdown = self.shutdown.clone();

        debug!(chunks = chunks.len(), batches, "Scheduling validation");

        let mut validated: Vec<ValidatedRow> = Vec::with_capacity(total);
        let mut stats = RunStats {
            total_records: total,
            ..RunStats::default()
        };

        for (batch_idx, batch) in chunks.chunks(self.workers).enumerate() {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                warn!(batch = batch_idx + 1, "Shutdown requested before batch");
                return Err(GuardError::aborted("validation cancelled"));
            }

            let halt = HaltOnDrop::default();
            let mut set = JoinSet::new();
            for &chunk in batch {
                let rows = Arc::clone(&rows);
                let validator = Arc::clone(&validator);
                let flag = halt.flag();
                log_chunk!(
                    self.log_config,
                    chunk.start = chunk.start_ordinal,
                    chunk.len = chunk.len,
                    batch = batch_idx + 1,
                    "Dispatching chunk"
                );
                set.spawn_blocking(move || validate_chunk(&rows, chunk, validator.as_ref(), &flag));
            }

            let mut results = Vec::with_capacity(batch.len());
            loop {
                let next = match shutdown.as_mut() {
                    Some(rx) => tokio::select! {
                        joined = set.join_next() => Next::Joined(joined),
                        () = cancelled(rx) => Next::Cancelled,
                    },
                    None => Next::Joined(set.join_next().await),
                };
                match next {
                    Next::Joined(None) => break,
                    Next::Joined(Some(Ok(result))) => {
                        log_chunk!(
                            self.log_config,
                            chunk.start = result.start_ordinal,
                            "Chunk finished"
                        );
                        results.push(result);
                    }
                    Next::Joined(Some(Err(e))) => {
                        halt.raise();
                        set.abort_all();
                        warn!(error = %e, batch = batch_idx + 1, "Chunk task failed");
                        return Err(GuardError::aborted(format!("chunk validation failed: {e}")));
                    }
                    Next::Cancelled => {
                        halt.raise();
                        set.abort_all();
                        warn!(batch = batch_idx + 1, "Shutdown requested during batch");
                        return Err(GuardError::aborted("validation cancelled"));
                    }
                }
            }

            // Completion order within a batch is arbitrary.
            results.sort_by_key(|result| result.start_ordinal);
            for result in results {
                for row in &result.rows {
                    if row.is_success() {
                        stats.success_count += 1;
                    } else {
                        stats.failure_count += 1;
                    }
                }
                validated.extend(result.rows);
            }
            stats.processed_count = validated.len();

            let update = ProgressUpdate::new(stats.processed_count, total, batch_idx + 1, batches);
            if self.log_config.log_progress {
                info!(
                    processed = update.processed,
                    total,
                    percent = update.percent,
                    batch = update.batch,
                    batches,
                    "Batch complete"
                );
            }
            observer
                .batch_completed(update)
                .await
                .map_err(|e| GuardError::aborted(format!("progress reporting failed: {e}")))?;
        }

        Ok(ScheduleOutcome {
            rows: validated,
            stats,
        })
    }
}

/// Halt flag shared with one batch's workers. Raised on drop so workers also
/// stop when the run future is dropped mid-batch.
#[derive(Default)]
struct HaltOnDrop(Arc<AtomicBool>);

impl HaltOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }

    fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Drop for HaltOnDrop {
    fn drop(&mut self) {
        self.raise();
    }
}

/// Validates a chunk, stopping early once `halt` is raised. A halted chunk's
/// partial result is never merged.
fn validate_chunk<V: RowValidator + ?Sized>(
    rows: &[Row],
    chunk: ChunkSpan,
    validator: &V,
    halt: &AtomicBool,
) -> ChunkResult {
    let mut validated = Vec::with_capacity(chunk.len);
    for (offset, row) in rows[chunk.range()].iter().enumerate() {
        if halt.load(Ordering::Relaxed) {
            break;
        }
        validated.push(validator.validate(row, chunk.start_ordinal + offset));
    }
    ChunkResult {
        start_ordinal: chunk.start_ordinal,
        rows: validated,
    }
}

/// Resolves once the channel carries `true`. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
