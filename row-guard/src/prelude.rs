//! Prelude for commonly used types and traits in row-guard.

pub use crate::config::PipelineConfig;
pub use crate::core::{Row, ValidatedRow, Value, Verdict};
pub use crate::error::{ErrorContext, GuardError, Result};
pub use crate::events::{EventFeed, EventPublisher, PipelineEvent};
pub use crate::logging::LogConfig;
pub use crate::pipeline::{PipelineContext, RunSummary, ValidationPipeline};
pub use crate::repository::{AuditStore, InMemoryAuditStore, InMemoryRulesStore, RulesStore, RunId, RunStatus};
pub use crate::rules::{CompiledRules, RuleDocument, UniqueMode};
pub use crate::storage::{BlobStore, ObjectStoreBlobStore};
pub use crate::validation::{ChunkScheduler, RowValidator, ValidationPlan};
