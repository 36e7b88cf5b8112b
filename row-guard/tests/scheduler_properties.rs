//! Property-based tests for duplicate detection and chunk scheduling.
//!
//! Row sets are generated with a small email alphabet so that duplicate keys
//! are common, then validated under random chunk sizes and worker counts.

use proptest::prelude::*;
use row_guard::core::{Headers, Row, ValidatedRow, Value};
use row_guard::rules::{RuleDocument, UniqueMode};
use row_guard::validation::{
    partition, ChunkScheduler, DuplicateIndex, NoopProgress, RowValidator, ValidationPlan,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn build_rows(cells: &[(u8, Option<i32>)]) -> Vec<Row> {
    let headers = Arc::new(Headers::from_raw(["email", "age"]));
    cells
        .iter()
        .map(|(email, age)| {
            Row::from_cells(
                &headers,
                vec![
                    Some(Value::text(format!("user{email}@example.com"))),
                    age.map(|a| Value::text(a.to_string())),
                ],
            )
        })
        .collect()
}

fn plan(rows: &[Row], mode: UniqueMode) -> ValidationPlan {
    let compiled = RuleDocument::from_value(&json!({
        "columns": {"age": {"type": "int", "required": true}},
        "unique_constraints": ["email"],
        "unique_mode": mode.to_string()
    }))
    .and_then(|doc| doc.compile())
    .unwrap();
    ValidationPlan::for_rows(compiled, rows)
}

fn is_duplicate(row: &ValidatedRow) -> bool {
    row.remarks().contains("Duplicate based on email")
}

fn group_sizes(cells: &[(u8, Option<i32>)]) -> HashMap<u8, usize> {
    let mut sizes = HashMap::new();
    for (email, _) in cells {
        *sizes.entry(*email).or_insert(0) += 1;
    }
    sizes
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn cells_strategy() -> impl Strategy<Value = Vec<(u8, Option<i32>)>> {
    prop::collection::vec((0u8..6, prop::option::weighted(0.9, -5i32..200)), 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scheduled_output_matches_sequential_validation(
        cells in cells_strategy(),
        chunk_size in 1usize..12,
        workers in 1usize..5,
    ) {
        let rows = build_rows(&cells);
        let plan = Arc::new(plan(&rows, UniqueMode::FailAll));
        let expected: Vec<ValidatedRow> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| plan.validate(row, i + 1))
            .collect();

        let scheduler = ChunkScheduler::new(chunk_size, workers).unwrap();
        let outcome = runtime()
            .block_on(scheduler.run(Arc::new(rows), Arc::clone(&plan), &NoopProgress))
            .unwrap();

        prop_assert_eq!(&outcome.rows, &expected);
        prop_assert_eq!(outcome.stats.total_records, cells.len());
        prop_assert_eq!(outcome.stats.processed_count, cells.len());
        prop_assert_eq!(
            outcome.stats.success_count + outcome.stats.failure_count,
            outcome.stats.total_records
        );
        let successes = expected.iter().filter(|r| r.is_success()).count();
        prop_assert_eq!(outcome.stats.success_count, successes);
    }

    #[test]
    fn validation_is_idempotent(cells in cells_strategy()) {
        let rows = build_rows(&cells);
        let plan = plan(&rows, UniqueMode::KeepFirst);
        for (i, row) in rows.iter().enumerate() {
            prop_assert_eq!(plan.validate(row, i + 1), plan.validate(row, i + 1));
        }
    }

    #[test]
    fn fail_all_marks_every_member_of_a_duplicate_group(cells in cells_strategy()) {
        let rows = build_rows(&cells);
        let plan = plan(&rows, UniqueMode::FailAll);
        let flagged = rows
            .iter()
            .enumerate()
            .filter(|(i, row)| is_duplicate(&plan.validate(row, i + 1)))
            .count();
        let expected: usize = group_sizes(&cells).values().filter(|&&n| n > 1).sum();
        prop_assert_eq!(flagged, expected);
    }

    #[test]
    fn keep_first_spares_only_the_first_occurrence(cells in cells_strategy()) {
        let rows = build_rows(&cells);
        let plan = plan(&rows, UniqueMode::KeepFirst);
        let mut seen = HashSet::new();
        for (i, (row, (email, _))) in rows.iter().zip(&cells).enumerate() {
            let first = seen.insert(*email);
            prop_assert_eq!(is_duplicate(&plan.validate(row, i + 1)), !first);
        }
    }

    #[test]
    fn ignore_mode_never_flags_duplicates(cells in cells_strategy()) {
        let rows = build_rows(&cells);
        let plan = plan(&rows, UniqueMode::Ignore);
        for (i, row) in rows.iter().enumerate() {
            prop_assert!(!is_duplicate(&plan.validate(row, i + 1)));
        }
    }

    #[test]
    fn index_has_one_entry_per_distinct_key(cells in cells_strategy()) {
        let rows = build_rows(&cells);
        let plan = plan(&rows, UniqueMode::FailAll);
        let index: &DuplicateIndex = plan.duplicates();
        prop_assert_eq!(index.len(), group_sizes(&cells).len());
    }

    #[test]
    fn partition_covers_every_row_once(total in 0usize..500, chunk_size in 1usize..64) {
        let spans = partition(total, chunk_size);
        let mut next = 1;
        for span in &spans {
            prop_assert_eq!(span.start_ordinal, next);
            prop_assert!(span.len >= 1 && span.len <= chunk_size);
            next += span.len;
        }
        prop_assert_eq!(next - 1, total);
    }
}

#[test]
fn required_check_precedes_type_check() {
    let rows = build_rows(&[(1, None), (2, Some(3))]);
    let plan = plan(&rows, UniqueMode::Ignore);
    let missing = plan.validate(&rows[0], 1);
    assert_eq!(missing.remarks(), "age is required");
}
