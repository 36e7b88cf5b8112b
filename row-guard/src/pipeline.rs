//! End-to-end validation runs.
//!
//! [`ValidationPipeline`] ties the components together for one run:
//!
//! 1. mark the audit record `running`
//! 2. load and compile the rule document
//! 3. fetch the upload and detect its content kind
//! 4. read every row, record `0/total` progress, publish `init`
//! 5. build the duplicate index and validate in chunks, reporting progress
//!    after every batch
//! 6. write the workbook and JSON artifacts, upload them and sign their URLs
//! 7. publish `completed` and mark the audit record `completed`
//!
//! Any failure marks the record `failed`, publishes an `error` event and is
//! returned to the caller. Event delivery is best effort throughout: a failed
//! publish is logged and the run carries on.
//!
//! # Example
//!
//! ```rust,no_run
//! use row_guard::config::PipelineConfig;
//! use row_guard::events::EventFeed;
//! use row_guard::pipeline::{PipelineContext, ValidationPipeline};
//! use row_guard::repository::{InMemoryAuditStore, InMemoryRulesStore};
//! use row_guard::storage::ObjectStoreBlobStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> row_guard::error::Result<()> {
//! let rules = InMemoryRulesStore::with_rules(
//!     "people",
//!     json!({"columns": {"email": {"required": true}}}),
//! );
//! let context = PipelineContext::new(
//!     Arc::new(ObjectStoreBlobStore::in_memory("row-guard")),
//!     Arc::new(InMemoryAuditStore::new()),
//!     Arc::new(rules),
//!     Arc::new(EventFeed::new()),
//!     PipelineConfig::default(),
//! );
//! let pipeline = ValidationPipeline::new(context)?;
//! let summary = pipeline
//!     .ingest("people.csv", b"email\na@x.com\n".to_vec(), Some("text/csv"), "people")
//!     .await?;
//! assert_eq!(summary.success_count, 1);
//! # Ok(())
//! # }
//! ```

use crate::config::PipelineConfig;
use crate::core::Row;
use crate::error::{ErrorContext, GuardError, Result};
use crate::events::{EventPublisher, PipelineEvent};
use crate::logging::truncate_field;
use crate::profiler::{ProfileReport, StepProfiler};
use crate::repository::{AuditStore, AuditUpdate, RulesStore, RunId, RunStatus};
use crate::rules::RuleDocument;
use crate::sources::{ContentKind, RecordSource};
use crate::storage::BlobStore;
use crate::validation::{ChunkScheduler, ProgressObserver, ProgressUpdate, ValidationPlan};
use crate::writer::{Artifacts, ResultWriter};
use crate::{log_io_op, perf_debug};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Collaborators and settings shared by every run of a pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub blobs: Arc<dyn BlobStore>,
    pub audits: Arc<dyn AuditStore>,
    pub rules: Arc<dyn RulesStore>,
    pub events: Arc<dyn EventPublisher>,
    pub config: PipelineConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_some())
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        audits: Arc<dyn AuditStore>,
        rules: Arc<dyn RulesStore>,
        events: Arc<dyn EventPublisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            blobs,
            audits,
            rules,
            events,
            config,
            shutdown: None,
        }
    }

    /// Cancels in-flight runs once `true` is sent on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    async fn notify(&self, run_id: &RunId, event: &PipelineEvent) {
        if let Err(e) = self.events.publish(run_id, event).await {
            warn!(run_id = %run_id, event = event.kind(), error = %e, "Could not publish event");
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total_records: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub spreadsheet_key: Option<String>,
    pub json_key: Option<String>,
    pub spreadsheet_url: Option<String>,
    pub json_url: Option<String>,
    pub profile: ProfileReport,
}

impl RunSummary {
    /// `PASS` when no row failed, `FAIL` otherwise.
    pub fn quality(&self) -> &'static str {
        quality(self.failure_count)
    }
}

fn quality(failure_count: usize) -> &'static str {
    if failure_count == 0 {
        "PASS"
    } else {
        "FAIL"
    }
}

/// File name of `key` without directories or extension.
fn artifact_base(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn join_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Persists batch progress and publishes it as a `progress` event.
struct RunProgress {
    run_id: RunId,
    context: PipelineContext,
}

#[async_trait]
impl ProgressObserver for RunProgress {
    async fn batch_completed(&self, update: ProgressUpdate) -> Result<()> {
        self.context
            .audits
            .update_progress(&self.run_id, update.processed, update.total)
            .await?;
        self.context
            .notify(&self.run_id, &PipelineEvent::progress(update.processed, update.percent))
            .await;
        Ok(())
    }
}

/// Runs validations against a [`PipelineContext`].
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    context: PipelineContext,
}

impl ValidationPipeline {
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] if the context's config is invalid.
    pub fn new(context: PipelineContext) -> Result<Self> {
        context.config.validate()?;
        Ok(Self { context })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Stores an upload under the input prefix, creates its audit record and
    /// validates it.
    ///
    /// Without an explicit content type, one is inferred from the file name.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        rules_ref: &str,
    ) -> Result<RunSummary> {
        let config = &self.context.config;
        let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        let key = join_key(
            &config.input_prefix,
            &format!("{}_{name}", Utc::now().format("%Y%m%dT%H%M%S")),
        );
        let content_type = content_type
            .map(str::to_string)
            .or_else(|| ContentKind::from_path(name).ok().map(|kind| kind.mime_type().to_string()));

        self.context
            .blobs
            .store(&config.bucket, &key, bytes, content_type.as_deref())
            .await
            .context("storing upload")?;
        let run_id = self.context.audits.create(name, rules_ref).await?;
        info!(run_id = %run_id, key = %key, "Upload stored");

        self.run(&run_id, &key, rules_ref).await
    }

    /// Validates the object at `input_key` against `rules_ref`.
    ///
    /// # Errors
    ///
    /// Every failure aborts the run. The audit record is marked `failed` with
    /// the error message and the original error is returned.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn run(&self, run_id: &RunId, input_key: &str, rules_ref: &str) -> Result<RunSummary> {
        info!(input_key, rules_ref, "Starting validation run");
        match self.execute(run_id, input_key, rules_ref).await {
            Ok(summary) => {
                info!(
                    total = summary.total_records,
                    success = summary.success_count,
                    failure = summary.failure_count,
                    quality = summary.quality(),
                    "Validation run completed"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(
                    error = %truncate_field(&e.to_string(), self.context.config.log_config.max_field_length),
                    kind = e.kind(),
                    "Validation run failed"
                );
                self.record_failure(run_id, &e).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, run_id: &RunId, err: &GuardError) {
        let message = err.to_string();
        if let Err(e) = self
            .context
            .audits
            .update_status(run_id, RunStatus::Failed, AuditUpdate::new().with_error(&message))
            .await
        {
            warn!(run_id = %run_id, error = %e, "Could not mark run as failed");
        }
        self.context.notify(run_id, &PipelineEvent::error(message)).await;
    }

    async fn execute(&self, run_id: &RunId, input_key: &str, rules_ref: &str) -> Result<RunSummary> {
        let context = &self.context;
        let config = &context.config;
        let mut profiler = StepProfiler::new();

        context
            .audits
            .update_status(run_id, RunStatus::Running, AuditUpdate::new())
            .await?;
        profiler.start();

        let document = context
            .rules
            .get_rules(rules_ref)
            .await?
            .ok_or_else(|| GuardError::RulesNotFound {
                rules_ref: rules_ref.to_string(),
            })?;
        let compiled = RuleDocument::from_value(&document)?.compile()?;
        debug!(
            fields = compiled.rules.len(),
            unique_mode = %compiled.policy.mode(),
            "Rules compiled"
        );
        profiler.step("load_rules");

        let blob = context
            .blobs
            .fetch(&config.bucket, input_key)
            .await
            .context("reading input")?;
        profiler.step("read_input");

        let kind = match blob.content_type.as_deref() {
            Some(content_type) => ContentKind::from_content_type(content_type)?,
            None => ContentKind::from_path(input_key)?,
        };
        info!(kind = %kind, bytes = blob.bytes.len(), "Input loaded");

        let bytes = blob.bytes;
        let rows: Vec<Row> = tokio::task::spawn_blocking(move || {
            RecordSource::open(bytes, kind)?.collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| GuardError::aborted(format!("reading input failed: {e}")))??;
        let total = rows.len();
        profiler.step("parse_input");

        context.audits.update_progress(run_id, 0, total).await?;
        context.notify(run_id, &PipelineEvent::init(total)).await;

        let plan = ValidationPlan::for_rows(compiled, &rows);
        debug!(duplicated_keys = plan.duplicates().duplicated_keys(), "Duplicate index built");
        profiler.step("index_duplicates");

        let mut scheduler = ChunkScheduler::new(config.chunk_size, config.workers)?
            .with_log_config(config.log_config.clone());
        if let Some(shutdown) = &context.shutdown {
            scheduler = scheduler.with_shutdown(shutdown.clone());
        }
        let observer = RunProgress {
            run_id: run_id.clone(),
            context: context.clone(),
        };
        let outcome = scheduler
            .run(Arc::new(rows), Arc::new(plan), &observer)
            .await?;
        let stats = outcome.stats;
        profiler.step("validate_records");

        let validated = outcome.rows;
        let artifacts = tokio::task::spawn_blocking(move || ResultWriter::new().write(&validated))
            .await
            .map_err(|e| GuardError::aborted(format!("writing artifacts failed: {e}")))??;
        profiler.step("write_artifacts");

        let uploaded = match artifacts {
            Some(artifacts) => {
                let uploaded = self
                    .upload(run_id, input_key, quality(stats.failure_count), artifacts)
                    .await?;
                profiler.step("upload_artifacts");
                Some(uploaded)
            }
            None => {
                info!("No records, skipping artifacts");
                None
            }
        };
        let (spreadsheet_key, json_key, spreadsheet_url, json_url) = match uploaded {
            Some(u) => (Some(u.spreadsheet_key), Some(u.json_key), Some(u.spreadsheet_url), Some(u.json_url)),
            None => (None, None, None, None),
        };

        context
            .notify(
                run_id,
                &PipelineEvent::Completed {
                    status: RunStatus::Completed,
                    percent: 100.0,
                    spreadsheet_url: spreadsheet_url.clone(),
                    json_url: json_url.clone(),
                    success_count: stats.success_count,
                    failure_count: stats.failure_count,
                },
            )
            .await;

        let profile = profiler.report();
        perf_debug!(
            config.log_config,
            total_sec = profile.total_sec,
            steps = profile.steps.len(),
            "Run profile"
        );
        context
            .audits
            .update_status(
                run_id,
                RunStatus::Completed,
                AuditUpdate::new()
                    .with_counts(total, stats.success_count, stats.failure_count)
                    .with_progress_percent(100.0)
                    .with_profile(profile.clone())
                    .with_artifact_keys(spreadsheet_key.clone(), json_key.clone()),
            )
            .await?;

        Ok(RunSummary {
            run_id: run_id.clone(),
            status: RunStatus::Completed,
            total_records: total,
            success_count: stats.success_count,
            failure_count: stats.failure_count,
            spreadsheet_key,
            json_key,
            spreadsheet_url,
            json_url,
            profile,
        })
    }

    async fn upload(
        &self,
        run_id: &RunId,
        input_key: &str,
        quality: &str,
        artifacts: Artifacts,
    ) -> Result<UploadedArtifacts> {
        let config = &self.context.config;
        let blobs = &self.context.blobs;
        let stem = format!("{}_{run_id}_{quality}", artifact_base(input_key));
        let spreadsheet_key = join_key(&config.output_prefix, &format!("{stem}.xlsx"));
        let json_key = join_key(&config.output_prefix, &format!("{stem}.json"));

        blobs
            .store(
                &config.bucket,
                &spreadsheet_key,
                artifacts.spreadsheet,
                Some(ContentKind::Spreadsheet.mime_type()),
            )
            .await
            .context("uploading workbook")?;
        log_io_op!(config.log_config, key = %spreadsheet_key, "Workbook uploaded");

        blobs
            .store(&config.bucket, &json_key, artifacts.json, Some(JSON_CONTENT_TYPE))
            .await
            .context("uploading json")?;
        log_io_op!(config.log_config, key = %json_key, "JSON uploaded");

        let spreadsheet_url = blobs
            .sign_url(&config.bucket, &spreadsheet_key, config.url_ttl)
            .await
            .context("signing workbook url")?;
        let json_url = blobs
            .sign_url(&config.bucket, &json_key, config.url_ttl)
            .await
            .context("signing json url")?;

        Ok(UploadedArtifacts {
            spreadsheet_key,
            json_key,
            spreadsheet_url,
            json_url,
        })
    }
}

struct UploadedArtifacts {
    spreadsheet_key: String,
    json_key: String,
    spreadsheet_url: String,
    json_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFeed;
    use crate::repository::{InMemoryAuditStore, InMemoryRulesStore};
    use crate::storage::ObjectStoreBlobStore;
    use crate::test_fixtures::{people_csv, people_rules};
    use serde_json::{json, Value};

    const BUCKET: &str = "row-guard";

    struct Harness {
        pipeline: ValidationPipeline,
        blobs: Arc<ObjectStoreBlobStore>,
        audits: Arc<InMemoryAuditStore>,
        feed: Arc<EventFeed>,
    }

    fn harness(config: PipelineConfig) -> Harness {
        let blobs = Arc::new(ObjectStoreBlobStore::in_memory(BUCKET));
        let audits = Arc::new(InMemoryAuditStore::new());
        let rules = InMemoryRulesStore::with_rules("people", people_rules());
        let feed = Arc::new(EventFeed::new());
        let context = PipelineContext::new(
            blobs.clone(),
            audits.clone(),
            Arc::new(rules),
            feed.clone(),
            config,
        );
        Harness {
            pipeline: ValidationPipeline::new(context).unwrap(),
            blobs,
            audits,
            feed,
        }
    }

    async fn event_types(feed: &EventFeed, run_id: &RunId) -> Vec<String> {
        feed.history(run_id)
            .await
            .iter()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                value["type"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_artifact_base() {
        assert_eq!(artifact_base("uploads/20240101T000000_people.csv"), "20240101T000000_people");
        assert_eq!(artifact_base("archive.tar.gz"), "archive.tar");
        assert_eq!(artifact_base("noext"), "noext");
        assert_eq!(artifact_base("dir/.hidden"), ".hidden");
    }

    #[tokio::test]
    async fn test_ingest_runs_to_completion() {
        let h = harness(PipelineConfig::new().with_chunk_size(4).with_workers(2));
        let summary = h
            .pipeline
            .ingest("people.csv", people_csv(20).into_bytes(), Some("text/csv"), "people")
            .await
            .unwrap();

        assert_eq!(summary.total_records, 20);
        assert_eq!(summary.success_count + summary.failure_count, 20);
        // rows 5, 10, 15, 20 have a bad age; rows 7 and 14 repeat an email
        assert_eq!(summary.failure_count, 6);
        assert_eq!(summary.quality(), "FAIL");

        let spreadsheet_key = summary.spreadsheet_key.clone().unwrap();
        assert!(spreadsheet_key.starts_with("validated/"));
        assert!(spreadsheet_key.ends_with(&format!("_people_{}_FAIL.xlsx", summary.run_id)));
        let json = h.blobs.fetch(BUCKET, summary.json_key.as_ref().unwrap()).await.unwrap();
        assert_eq!(json.content_type.as_deref(), Some("application/json"));
        let rows: Vec<Value> = serde_json::from_slice(&json.bytes).unwrap();
        assert_eq!(rows.len(), 20);
        assert_eq!(rows[6]["Remarks"], "Duplicate based on email");

        let record = h.audits.get(&summary.run_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.file_name, "people.csv");
        assert_eq!(record.failure_count, Some(6));
        assert_eq!(record.progress_percent, 100.0);
        assert_eq!(record.json_key, summary.json_key);
        assert!(record.profile.is_some());

        // 5 chunks of 4 rows, 2 workers: 3 batches
        let events = event_types(&h.feed, &summary.run_id).await;
        assert_eq!(events, vec!["init", "progress", "progress", "progress", "completed"]);
    }

    #[tokio::test]
    async fn test_missing_rules_marks_run_failed() {
        let h = harness(PipelineConfig::default());
        let err = h
            .pipeline
            .ingest("people.csv", people_csv(3).into_bytes(), None, "unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::RulesNotFound { .. }));

        let run_id = h.feed_run_id().await;
        let record = h.audits.get(&run_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("No rules found for rules_ref=unknown")
        );
        assert_eq!(event_types(&h.feed, &run_id).await, vec!["error"]);
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let h = harness(PipelineConfig::default());
        let err = h
            .pipeline
            .ingest("report.pdf", b"%PDF".to_vec(), Some("application/pdf"), "people")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_completes_without_artifacts() {
        let h = harness(PipelineConfig::default());
        let summary = h
            .pipeline
            .ingest("empty.csv", b"id,email,age\n".to_vec(), Some("text/csv"), "people")
            .await
            .unwrap();
        assert_eq!(summary.total_records, 0);
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.failure_count, 0);
        assert!(summary.spreadsheet_key.is_none());
        assert!(summary.json_url.is_none());

        let record = h.audits.get(&summary.run_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.total_records, Some(0));
        let events = event_types(&h.feed, &summary.run_id).await;
        assert_eq!(events, vec!["init", "completed"]);
    }

    #[tokio::test]
    async fn test_missing_input_is_storage_error() {
        let h = harness(PipelineConfig::default());
        let run_id = h.audits.create("gone.csv", "people").await.unwrap();
        let err = h
            .pipeline
            .run(&run_id, "uploads/gone.csv", "people")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::StorageUnavailable { .. }));
        let record = h.audits.get(&run_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_run_fails() {
        let (tx, rx) = watch::channel(false);
        let blobs = Arc::new(ObjectStoreBlobStore::in_memory(BUCKET));
        let audits = Arc::new(InMemoryAuditStore::new());
        let context = PipelineContext::new(
            blobs,
            audits.clone(),
            Arc::new(InMemoryRulesStore::with_rules("r", json!({"columns": {}}))),
            Arc::new(EventFeed::new()),
            PipelineConfig::default(),
        )
        .with_shutdown(rx);
        let pipeline = ValidationPipeline::new(context).unwrap();
        tx.send(true).unwrap();

        let err = pipeline
            .ingest("a.csv", b"a\n1\n".to_vec(), None, "r")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::PipelineAborted { .. }));
    }

    impl Harness {
        /// Id of the only run published to the feed.
        async fn feed_run_id(&self) -> RunId {
            let mut ids = Vec::new();
            for candidate in self.audits.run_ids().await {
                if !self.feed.history(&candidate).await.is_empty() {
                    ids.push(candidate);
                }
            }
            assert_eq!(ids.len(), 1);
            ids.remove(0)
        }
    }
}
