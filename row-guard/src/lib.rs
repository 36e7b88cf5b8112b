//! # row-guard - chunked row validation for tabular uploads
//!
//! row-guard validates every row of an uploaded spreadsheet or delimited text
//! file against a JSON rule document: required fields, type conformance,
//! regular expression patterns and multi-field uniqueness. Rows are never
//! dropped; each one comes back annotated with a `Valid` verdict and a
//! `Remarks` text, and the results are written as a color-coded workbook and a
//! JSON array.
//!
//! ## Overview
//!
//! A run flows through these parts:
//!
//! - [`sources`] reads the upload into ordered [`core::Row`]s
//! - [`rules`] compiles the rule document
//! - [`validation`] builds the duplicate index, validates rows and schedules
//!   chunks over blocking worker threads
//! - [`writer`] renders the artifacts
//! - [`events`] publishes progress for live subscribers
//! - [`pipeline`] orchestrates a run against [`storage`] and [`repository`]
//!   collaborators
//!
//! ## Quick Start
//!
//! ```rust
//! use row_guard::prelude::*;
//!
//! # fn example() -> row_guard::error::Result<()> {
//! let compiled = RuleDocument::from_json(
//!     r#"{
//!         "columns": {"age": {"type": "int", "required": true}},
//!         "unique_constraints": ["email"],
//!         "unique_mode": "fail_all"
//!     }"#,
//! )?
//! .compile()?;
//!
//! let rows = vec![
//!     Row::from_pairs([("email", Some(Value::text("a@x.com"))), ("age", Some(Value::text("30")))]),
//!     Row::from_pairs([("email", Some(Value::text("a@x.com"))), ("age", Some(Value::text("bad")))]),
//! ];
//! let plan = ValidationPlan::for_rows(compiled, &rows);
//!
//! let second = plan.validate(&rows[1], 2);
//! assert_eq!(second.valid(), Verdict::Fail);
//! assert_eq!(second.remarks(), "age invalid int, Duplicate based on email");
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a pipeline
//!
//! [`pipeline::ValidationPipeline`] drives complete runs. Its collaborators are
//! traits ([`storage::BlobStore`], [`repository::AuditStore`],
//! [`repository::RulesStore`], [`events::EventPublisher`]); the crate ships
//! in-memory implementations and an `object_store` backed blob store with
//! optional S3, GCS and Azure support (`s3`, `gcs`, `azure` features).
//!
//! ## Logging
//!
//! Everything is instrumented with `tracing`. Binaries install a subscriber
//! with [`logging::setup::init_logging`]; per-chunk and storage detail is gated
//! by [`logging::LogConfig`].

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod profiler;
pub mod repository;
pub mod rules;
pub mod sources;
pub mod storage;
pub mod validation;
pub mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;
