//! Audit and rules persistence.
//!
//! The pipeline records each run's lifecycle in an [`AuditStore`] and loads
//! rule documents from a [`RulesStore`]. Both are async traits so that
//! database-backed implementations can be plugged in; in-memory versions live
//! in [`in_memory`].
//!
//! # Example
//!
//! ```rust
//! use row_guard::repository::{AuditStore, InMemoryAuditStore, RunStatus};
//!
//! # async fn example() -> row_guard::error::Result<()> {
//! let audits = InMemoryAuditStore::new();
//! let run_id = audits.create("people.csv", "rules-1").await?;
//! audits.update_progress(&run_id, 50, 200).await?;
//!
//! let record = audits.get(&run_id).await?.unwrap();
//! assert_eq!(record.status, RunStatus::Pending);
//! assert_eq!(record.progress_percent, 25.0);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::profiler::ProfileReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod in_memory;

pub use in_memory::{InMemoryAuditStore, InMemoryRulesStore};

/// Identifier of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        RunId(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        RunId(value.to_string())
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent state of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: RunId,
    pub file_name: String,
    pub rules_ref: String,
    pub status: RunStatus,
    pub total_records: Option<usize>,
    pub processed_records: usize,
    pub success_count: Option<usize>,
    pub failure_count: Option<usize>,
    pub progress_percent: f64,
    pub profile: Option<ProfileReport>,
    pub error_message: Option<String>,
    pub spreadsheet_key: Option<String>,
    pub json_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(run_id: RunId, file_name: impl Into<String>, rules_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            file_name: file_name.into(),
            rules_ref: rules_ref.into(),
            status: RunStatus::Pending,
            total_records: None,
            processed_records: 0,
            success_count: None,
            failure_count: None,
            progress_percent: 0.0,
            profile: None,
            error_message: None,
            spreadsheet_key: None,
            json_key: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional fields set alongside a status change. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditUpdate {
    pub total_records: Option<usize>,
    pub success_count: Option<usize>,
    pub failure_count: Option<usize>,
    pub progress_percent: Option<f64>,
    pub profile: Option<ProfileReport>,
    pub error_message: Option<String>,
    pub spreadsheet_key: Option<String>,
    pub json_key: Option<String>,
}

impl AuditUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(mut self, total: usize, success: usize, failure: usize) -> Self {
        self.total_records = Some(total);
        self.success_count = Some(success);
        self.failure_count = Some(failure);
        self
    }

    pub fn with_progress_percent(mut self, percent: f64) -> Self {
        self.progress_percent = Some(percent);
        self
    }

    pub fn with_profile(mut self, profile: ProfileReport) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_artifact_keys(mut self, spreadsheet: Option<String>, json: Option<String>) -> Self {
        self.spreadsheet_key = spreadsheet;
        self.json_key = json;
        self
    }

    /// Copies every set field onto `record`.
    pub fn apply_to(self, record: &mut AuditRecord) {
        if let Some(total) = self.total_records {
            record.total_records = Some(total);
        }
        if let Some(success) = self.success_count {
            record.success_count = Some(success);
        }
        if let Some(failure) = self.failure_count {
            record.failure_count = Some(failure);
        }
        if let Some(percent) = self.progress_percent {
            record.progress_percent = percent;
        }
        if self.profile.is_some() {
            record.profile = self.profile;
        }
        if self.error_message.is_some() {
            record.error_message = self.error_message;
        }
        if self.spreadsheet_key.is_some() {
            record.spreadsheet_key = self.spreadsheet_key;
        }
        if self.json_key.is_some() {
            record.json_key = self.json_key;
        }
    }
}

/// Store of run audit records.
///
/// Updates addressed to an unknown run are ignored, not errors.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Creates a `pending` record and returns its id.
    async fn create(&self, file_name: &str, rules_ref: &str) -> Result<RunId>;

    /// Records progress; the percentage is derived (zero when `total` is zero).
    async fn update_progress(&self, run_id: &RunId, processed: usize, total: usize) -> Result<()>;

    /// Sets the status and applies `update`.
    async fn update_status(&self, run_id: &RunId, status: RunStatus, update: AuditUpdate) -> Result<()>;

    async fn get(&self, run_id: &RunId) -> Result<Option<AuditRecord>>;
}

/// Source of rule documents, addressed by an opaque reference.
#[async_trait]
pub trait RulesStore: Send + Sync {
    /// Returns the raw rule document, or `None` if the reference is unknown.
    async fn get_rules(&self, rules_ref: &str) -> Result<Option<serde_json::Value>>;
}
