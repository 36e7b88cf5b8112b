//! Shared fixtures for row-guard tests.
//!
//! Builders for rows, compiled rule documents and small uploads used across the
//! unit tests of several modules.

use crate::core::{Headers, Row, Value};
use crate::rules::{CompiledRules, RuleDocument};
use std::sync::Arc;

/// Compiles a rule document given as JSON, panicking on invalid input.
pub fn rules(document: serde_json::Value) -> CompiledRules {
    RuleDocument::from_value(&document)
        .and_then(|doc| doc.compile())
        .unwrap_or_else(|e| panic!("fixture rule document must compile: {e}"))
}

/// Builds a standalone row whose values are all text.
pub fn text_row(pairs: &[(&str, &str)]) -> Row {
    Row::from_pairs(pairs.iter().map(|(k, v)| (*k, Some(Value::text(*v)))))
}

/// Builds `count` rows sharing one header set: `id` (1-based), `email` and `age`.
///
/// Every seventh row repeats the email of the row before it and every fifth row
/// has a non-numeric age.
pub fn people(count: usize) -> Vec<Row> {
    let headers = Arc::new(Headers::from_raw(["id", "email", "age"]));
    (1..=count)
        .map(|id| {
            let email_id = if id % 7 == 0 { id - 1 } else { id };
            let age = if id % 5 == 0 {
                "unknown".to_string()
            } else {
                (20 + id % 50).to_string()
            };
            Row::from_cells(
                &headers,
                vec![
                    Some(Value::text(id.to_string())),
                    Some(Value::text(format!("user{email_id}@example.com"))),
                    Some(Value::text(age)),
                ],
            )
        })
        .collect()
}

/// The rule document matching [`people`].
pub fn people_rules() -> serde_json::Value {
    serde_json::json!({
        "columns": {
            "id": {"type": "int", "required": true},
            "email": {"type": "str", "required": true, "regex": "[^@]+@[^@]+"},
            "age": {"type": "int"}
        },
        "unique_constraints": ["email"],
        "unique_mode": "keep_first"
    })
}

/// CSV text for the [`people`] fixture.
pub fn people_csv(count: usize) -> String {
    let mut csv = String::from("Id,Email,Age\n");
    for row in people(count) {
        let cells: Vec<String> = row
            .iter()
            .map(|(_, value)| value.map(ToString::to_string).unwrap_or_default())
            .collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}
