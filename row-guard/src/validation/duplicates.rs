//! Duplicate detection over the whole upload.
//!
//! The index is built from every row before any row is validated, so a row's
//! duplicate status can depend on rows that come after it.

use crate::core::{KeyPart, Row};
use crate::rules::UniquePolicy;
use std::collections::HashMap;

/// Composite uniqueness key. Absent fields are `None`, which is distinct from
/// an empty string but equal to other absent fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey(Vec<Option<KeyPart>>);

impl UniqueKey {
    /// Projects a row onto the policy's key fields.
    pub fn of(row: &Row, fields: &[String]) -> Self {
        UniqueKey(
            fields
                .iter()
                .map(|field| row.get(field).map(|value| value.key_part()))
                .collect(),
        )
    }
}

/// Occurrence count and 1-based ordinal of the first row with a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub count: usize,
    pub first_ordinal: usize,
}

/// Read-only map from uniqueness key to its [`DuplicateEntry`].
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    entries: HashMap<UniqueKey, DuplicateEntry>,
}

impl DuplicateIndex {
    /// Builds the index in one pass over `rows`.
    ///
    /// An empty key field list yields an empty index. The policy's mode is not
    /// consulted; an `ignore` policy with key fields still gets an index.
    pub fn build(rows: &[Row], policy: &UniquePolicy) -> Self {
        let fields = policy.fields();
        if fields.is_empty() {
            return Self::default();
        }

        let mut entries: HashMap<UniqueKey, DuplicateEntry> = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            entries
                .entry(UniqueKey::of(row, fields))
                .and_modify(|entry| entry.count += 1)
                .or_insert(DuplicateEntry {
                    count: 1,
                    first_ordinal: idx + 1,
                });
        }
        Self { entries }
    }

    /// Looks up a key.
    pub fn lookup(&self, key: &UniqueKey) -> Option<DuplicateEntry> {
        self.entries.get(key).copied()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys were indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys seen more than once.
    pub fn duplicated_keys(&self) -> usize {
        self.entries.values().filter(|e| e.count > 1).count()
    }
}
