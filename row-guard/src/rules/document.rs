//! Declarative rule documents.

use super::{compile_pattern, CompiledRules, FieldRule, FieldType, RuleSet, UniqueMode, UniquePolicy};
use crate::error::{GuardError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Longest accepted regex pattern, in bytes.
pub const MAX_PATTERN_LENGTH: usize = 1000;

/// Rule document as stored in the rules store.
///
/// ```json
/// {
///   "columns": {
///     "age":   {"type": "int", "required": true},
///     "email": {"type": "str", "regex": "[^@]+@[^@]+"}
///   },
///   "unique_constraints": ["email"],
///   "unique_mode": "keep_first"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDocument {
    /// Column rules, in document order
    #[serde(default, deserialize_with = "ordered_columns")]
    pub columns: Vec<(String, FieldRuleSpec)>,
    #[serde(default)]
    pub unique_constraints: Option<Vec<String>>,
    #[serde(default)]
    pub unique_mode: Option<String>,
}

/// One column's rule as written in the document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldRuleSpec {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
}

impl RuleDocument {
    /// Parses a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidRuleDefinition`] when the value does not
    /// have the document's shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        RuleDocument::deserialize(value)
            .map_err(|e| GuardError::invalid_rule(format!("malformed rule document: {e}")))
    }

    /// Parses a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| GuardError::invalid_rule(format!("malformed rule document: {e}")))
    }

    /// Compiles the document into an immutable rule set and unique policy.
    ///
    /// Every regex is compiled here so a malformed pattern fails the run
    /// before any row is read.
    pub fn compile(&self) -> Result<CompiledRules> {
        let mut rules = RuleSet::new();
        for (name, spec) in &self.columns {
            let field = name.to_lowercase();
            let pattern = match spec.regex.as_deref() {
                Some(pattern) if !pattern.is_empty() => Some(compile_pattern(&field, pattern)?),
                _ => None,
            };
            rules.insert(
                &field,
                FieldRule {
                    required: spec.required.unwrap_or(false),
                    field_type: spec.field_type.as_deref().map(FieldType::parse),
                    pattern,
                },
            );
        }

        let mode = UniqueMode::parse(self.unique_mode.as_deref().unwrap_or("ignore"))?;
        let policy = UniquePolicy::new(self.unique_constraints.iter().flatten(), mode);

        Ok(CompiledRules { rules, policy })
    }
}

fn ordered_columns<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, FieldRuleSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ColumnsVisitor;

    impl<'de> Visitor<'de> for ColumnsVisitor {
        type Value = Vec<(String, FieldRuleSpec)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from column name to column rule")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut columns = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, spec)) = map.next_entry::<String, FieldRuleSpec>()? {
                columns.push((name, spec));
            }
            Ok(columns)
        }
    }

    deserializer.deserialize_map(ColumnsVisitor)
}
