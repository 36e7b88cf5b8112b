//! Per-row validation.

use super::coercion::conforms;
use super::duplicates::{DuplicateIndex, UniqueKey};
use crate::core::{Row, ValidatedRow, Value};
use crate::rules::{CompiledRules, RuleSet, UniqueMode, UniquePolicy};

/// Turns one row into a [`ValidatedRow`].
///
/// Implementations must be pure with respect to the row: the same row and
/// ordinal always produce the same result, and calls may run concurrently.
pub trait RowValidator: Send + Sync {
    /// Validates the row at the given 1-based ordinal.
    fn validate(&self, row: &Row, ordinal: usize) -> ValidatedRow;
}

/// Compiled rules, unique policy and duplicate index for one run.
#[derive(Debug, Clone)]
pub struct ValidationPlan {
    rules: RuleSet,
    policy: UniquePolicy,
    duplicates: DuplicateIndex,
}

impl ValidationPlan {
    pub fn new(compiled: CompiledRules, duplicates: DuplicateIndex) -> Self {
        Self {
            rules: compiled.rules,
            policy: compiled.policy,
            duplicates,
        }
    }

    /// Builds the duplicate index from `rows` and wraps everything in a plan.
    pub fn for_rows(compiled: CompiledRules, rows: &[Row]) -> Self {
        let duplicates = DuplicateIndex::build(rows, &compiled.policy);
        Self::new(compiled, duplicates)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn policy(&self) -> &UniquePolicy {
        &self.policy
    }

    pub fn duplicates(&self) -> &DuplicateIndex {
        &self.duplicates
    }

    /// Collects the violations for a row, field rules first, in rule order.
    pub fn violations(&self, row: &Row, ordinal: usize) -> Vec<String> {
        let mut violations = Vec::new();

        for (field, rule) in self.rules.iter() {
            let value = row.get(field);
            if rule.required && value.map_or(true, Value::is_blank) {
                violations.push(format!("{field} is required"));
                continue;
            }

            let Some(value) = value else { continue };
            if matches!(value, Value::Text(s) if s.is_empty()) {
                continue;
            }

            if let Some(field_type) = &rule.field_type {
                if !conforms(value, field_type) {
                    violations.push(format!("{field} invalid {field_type}"));
                    continue;
                }
            }

            if let Some(pattern) = &rule.pattern {
                if !pattern.is_match(&value.to_string()) {
                    violations.push(format!("{field} does not match pattern"));
                }
            }
        }

        if self.is_duplicate(row, ordinal) {
            violations.push(self.policy.violation());
        }

        violations
    }

    fn is_duplicate(&self, row: &Row, ordinal: usize) -> bool {
        if !self.policy.is_active() {
            return false;
        }
        let key = UniqueKey::of(row, self.policy.fields());
        let (count, first_ordinal) = self
            .duplicates
            .lookup(&key)
            .map_or((1, ordinal), |entry| (entry.count, entry.first_ordinal));
        if count <= 1 {
            return false;
        }
        match self.policy.mode() {
            UniqueMode::FailAll => true,
            UniqueMode::KeepFirst => ordinal != first_ordinal,
            UniqueMode::Ignore => false,
        }
    }
}

impl RowValidator for ValidationPlan {
    fn validate(&self, row: &Row, ordinal: usize) -> ValidatedRow {
        ValidatedRow::from_violations(row.clone(), self.violations(row, ordinal))
    }
}
