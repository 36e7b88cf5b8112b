//! Row validation: duplicate index, per-row checks and the chunk scheduler.
//!
//! The pieces fit together like this:
//!
//! 1. [`DuplicateIndex::build`] makes one pass over all rows.
//! 2. [`ValidationPlan`] bundles the compiled rules with that index and
//!    implements [`RowValidator`].
//! 3. [`ChunkScheduler::run`] fans the plan out over chunks of rows and merges
//!    the results back in input order.

pub mod coercion;
pub mod duplicates;
pub mod scheduler;
pub mod validator;

pub use duplicates::{DuplicateEntry, DuplicateIndex, UniqueKey};
pub use scheduler::{
    partition, progress_percent, ChunkScheduler, ChunkSpan, NoopProgress, ProgressObserver,
    ProgressUpdate, RunStats, ScheduleOutcome, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS,
};
pub use validator::{RowValidator, ValidationPlan};
