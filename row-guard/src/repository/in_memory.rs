//! In-memory store implementations for tests, demos and the CLI.

use super::{AuditRecord, AuditStore, AuditUpdate, RulesStore, RunId, RunStatus};
use crate::error::Result;
use crate::validation::progress_percent;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Audit records held in a shared map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    records: Arc<RwLock<HashMap<RunId, AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Ids of every stored run, sorted.
    pub async fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create(&self, file_name: &str, rules_ref: &str) -> Result<RunId> {
        let run_id = RunId::generate();
        let record = AuditRecord::new(run_id.clone(), file_name, rules_ref);
        self.records.write().await.insert(run_id.clone(), record);
        debug!(run_id = %run_id, file_name, "Created audit record");
        Ok(run_id)
    }

    async fn update_progress(&self, run_id: &RunId, processed: usize, total: usize) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(run_id) else {
            warn!(run_id = %run_id, "Progress update for unknown run ignored");
            return Ok(());
        };
        record.processed_records = processed;
        record.total_records = Some(total);
        record.progress_percent = progress_percent(processed, total);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, run_id: &RunId, status: RunStatus, update: AuditUpdate) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(run_id) else {
            warn!(run_id = %run_id, status = %status, "Status update for unknown run ignored");
            return Ok(());
        };
        update.apply_to(record);
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> Result<Option<AuditRecord>> {
        Ok(self.records.read().await.get(run_id).cloned())
    }
}

/// Rule documents held in a shared map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRulesStore {
    documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryRulesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding one document.
    pub fn with_rules(rules_ref: impl Into<String>, document: serde_json::Value) -> Self {
        let mut documents = HashMap::new();
        documents.insert(rules_ref.into(), document);
        Self {
            documents: Arc::new(RwLock::new(documents)),
        }
    }

    /// Adds or replaces a document.
    pub async fn insert(&self, rules_ref: impl Into<String>, document: serde_json::Value) {
        self.documents.write().await.insert(rules_ref.into(), document);
    }
}

#[async_trait]
impl RulesStore for InMemoryRulesStore {
    async fn get_rules(&self, rules_ref: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.documents.read().await.get(rules_ref).cloned())
    }
}
