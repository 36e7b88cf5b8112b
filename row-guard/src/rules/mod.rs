//! Compiled validation rules.
//!
//! A declarative [`RuleDocument`] is compiled once per run into an immutable
//! [`RuleSet`] (per-field constraints) and a [`UniquePolicy`] (duplicate
//! detection). Both are read-only afterwards and shared by every worker.
//!
//! ```rust
//! use row_guard::rules::{RuleDocument, UniqueMode};
//!
//! # fn example() -> row_guard::error::Result<()> {
//! let compiled = RuleDocument::from_json(r#"{
//!     "columns": {"Age": {"type": "int", "required": true}},
//!     "unique_constraints": ["Email"],
//!     "unique_mode": "fail_all"
//! }"#)?
//! .compile()?;
//!
//! assert!(compiled.rules.get("age").is_some());
//! assert_eq!(compiled.policy.fields(), &["email".to_string()]);
//! assert_eq!(compiled.policy.mode(), UniqueMode::FailAll);
//! # Ok(())
//! # }
//! ```

use crate::error::{GuardError, Result};
use regex::Regex;
use std::fmt;

mod document;

pub use document::{FieldRuleSpec, RuleDocument, MAX_PATTERN_LENGTH};

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Decimal,
    Date,
    Str,
    /// A type name the compiler does not know; never enforced
    Unchecked(String),
}

impl FieldType {
    /// Parses a declared type name. Matching is exact (`"int"`, not `"INT"`).
    pub fn parse(name: &str) -> Self {
        match name {
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "decimal" => FieldType::Decimal,
            "date" => FieldType::Date,
            "str" => FieldType::Str,
            other => FieldType::Unchecked(other.to_string()),
        }
    }

    /// Returns true for the built-in, enforced types.
    pub fn is_enforced(&self) -> bool {
        !matches!(self, FieldType::Unchecked(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Decimal => write!(f, "decimal"),
            FieldType::Date => write!(f, "date"),
            FieldType::Str => write!(f, "str"),
            FieldType::Unchecked(name) => write!(f, "{name}"),
        }
    }
}

/// Constraints on one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Absent or blank values are violations
    pub required: bool,
    /// Declared type, if any
    pub field_type: Option<FieldType>,
    /// Pattern anchored at the start of the value's text
    pub pattern: Option<Regex>,
}

impl FieldRule {
    /// A rule with no constraints.
    pub fn new() -> Self {
        Self {
            required: false,
            field_type: None,
            pattern: None,
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the declared type.
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Sets the pattern, compiling it anchored at the start of the text.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::InvalidRuleDefinition`] if the pattern does not compile.
    pub fn with_pattern(mut self, field: &str, pattern: &str) -> Result<Self> {
        self.pattern = Some(compile_pattern(field, pattern)?);
        Ok(self)
    }
}

impl Default for FieldRule {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn compile_pattern(field: &str, pattern: &str) -> Result<Regex> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(GuardError::invalid_rule(format!(
            "pattern for '{field}' too long (max {MAX_PATTERN_LENGTH} characters)"
        )));
    }
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
        GuardError::invalid_rule(format!("invalid pattern for '{field}': {e}"))
    })
}

/// Field rules keyed by lowercase field name, in rule-document order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: Vec<(String, FieldRule)>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule. The name is case-folded; re-inserting a name replaces
    /// the earlier rule in place.
    pub fn insert(&mut self, field: impl AsRef<str>, rule: FieldRule) {
        let field = field.as_ref().to_lowercase();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = rule,
            None => self.fields.push((field, rule)),
        }
    }

    /// Builder-style insert.
    pub fn with_rule(mut self, field: impl AsRef<str>, rule: FieldRule) -> Self {
        self.insert(field, rule);
        self
    }

    /// Looks up the rule for a lowercase field name.
    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, rule)| rule)
    }

    /// Iterates `(field, rule)` pairs in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Number of fields with rules.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field has rules.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// How duplicate keys are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniqueMode {
    /// Duplicates are not reported
    #[default]
    Ignore,
    /// Every occurrence of a repeated key fails
    FailAll,
    /// The first occurrence passes, later ones fail
    KeepFirst,
}

impl UniqueMode {
    /// Parses a mode name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "ignore" => Ok(UniqueMode::Ignore),
            "fail_all" => Ok(UniqueMode::FailAll),
            "keep_first" => Ok(UniqueMode::KeepFirst),
            other => Err(GuardError::invalid_rule(format!(
                "unknown unique_mode '{other}' (expected ignore, fail_all or keep_first)"
            ))),
        }
    }
}

impl fmt::Display for UniqueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueMode::Ignore => write!(f, "ignore"),
            UniqueMode::FailAll => write!(f, "fail_all"),
            UniqueMode::KeepFirst => write!(f, "keep_first"),
        }
    }
}

/// Fields forming the uniqueness key, plus the duplicate mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniquePolicy {
    fields: Vec<String>,
    mode: UniqueMode,
}

impl UniquePolicy {
    /// Creates a policy; field names are case-folded.
    pub fn new<I, S>(fields: I, mode: UniqueMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| f.as_ref().to_lowercase())
                .collect(),
            mode,
        }
    }

    /// A policy that never reports duplicates.
    pub fn ignore() -> Self {
        Self::default()
    }

    /// Key fields, in key order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Duplicate mode.
    pub fn mode(&self) -> UniqueMode {
        self.mode
    }

    /// Returns true when rows must be checked for duplicates.
    pub fn is_active(&self) -> bool {
        self.mode != UniqueMode::Ignore && !self.fields.is_empty()
    }

    /// The violation text reported for a duplicate row.
    pub fn violation(&self) -> String {
        format!("Duplicate based on {}", self.fields.join(", "))
    }
}

/// The output of compiling a rule document.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub rules: RuleSet,
    pub policy: UniquePolicy,
}
