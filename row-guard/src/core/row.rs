//! Rows and validated rows.

use super::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the verdict column appended to every validated row.
pub const VALID_FIELD: &str = "Valid";
/// Name of the remarks column appended to every validated row.
pub const REMARKS_FIELD: &str = "Remarks";
/// Remarks text written when a row has no violations.
pub const SUCCESS_REMARK: &str = "Validated Successfully";

/// Ordered, lowercased header names shared by every row of one source.
///
/// Raw header cells are trimmed and lowercased. When two raw columns fold to
/// the same name the name keeps its first position and the later column's
/// value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    names: Vec<String>,
    positions: HashMap<String, usize>,
    /// Raw column index -> slot in `names`
    columns: Vec<usize>,
}

impl Headers {
    /// Builds headers from raw header cells.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();
        let mut positions = HashMap::new();
        let mut columns = Vec::new();
        for cell in raw {
            let name = cell.as_ref().trim().to_lowercase();
            let slot = *positions.entry(name.clone()).or_insert_with(|| {
                names.push(name);
                names.len() - 1
            });
            columns.push(slot);
        }
        Self {
            names,
            positions,
            columns,
        }
    }

    /// Header names in first-seen order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of raw columns the header row had.
    pub fn raw_width(&self) -> usize {
        self.columns.len()
    }

    /// Slot of a (lowercase) field name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One input row: an ordered mapping from lowercase field name to an optional value.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    headers: Arc<Headers>,
    values: Vec<Option<Value>>,
}

impl Row {
    /// Builds a row from raw cells aligned with the raw header columns.
    ///
    /// Missing trailing cells become `None`; cells beyond the header width are dropped.
    pub fn from_cells(headers: &Arc<Headers>, mut cells: Vec<Option<Value>>) -> Self {
        let mut values = vec![None; headers.len()];
        cells.truncate(headers.raw_width());
        cells.resize(headers.raw_width(), None);
        for (raw_idx, cell) in cells.into_iter().enumerate() {
            values[headers.columns[raw_idx]] = cell;
        }
        Self {
            headers: Arc::clone(headers),
            values,
        }
    }

    /// Builds a standalone row from `(field, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<Value>)>,
        S: AsRef<str>,
    {
        let (names, cells): (Vec<String>, Vec<Option<Value>>) = pairs
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_string(), value))
            .unzip();
        let headers = Arc::new(Headers::from_raw(names));
        Self::from_cells(&headers, cells)
    }

    /// The headers this row was read with.
    pub fn headers(&self) -> &Arc<Headers> {
        &self.headers
    }

    /// Looks up a field by lowercase name. Absent fields and empty cells both return `None`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.headers
            .position(field)
            .and_then(|slot| self.values[slot].as_ref())
    }

    /// Iterates `(field, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.headers
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_ref))
    }
}

/// Pass/fail outcome of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Success,
    Fail,
}

impl Verdict {
    /// Returns the verdict's column text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Success => "Success",
            Verdict::Fail => "Fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row plus its derived `Valid` and `Remarks` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    row: Row,
    valid: Verdict,
    remarks: String,
}

impl ValidatedRow {
    /// Creates a validated row from its violations.
    pub fn from_violations(row: Row, violations: Vec<String>) -> Self {
        if violations.is_empty() {
            Self {
                row,
                valid: Verdict::Success,
                remarks: SUCCESS_REMARK.to_string(),
            }
        } else {
            Self {
                row,
                valid: Verdict::Fail,
                remarks: violations.join(", "),
            }
        }
    }

    /// The original row.
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The pass/fail verdict.
    pub fn valid(&self) -> Verdict {
        self.valid
    }

    /// The remarks text.
    pub fn remarks(&self) -> &str {
        &self.remarks
    }

    /// Returns true if the row passed every check.
    pub fn is_success(&self) -> bool {
        self.valid == Verdict::Success
    }

    /// Output column names: the row's headers followed by `Valid` and `Remarks`.
    pub fn output_headers(&self) -> Vec<String> {
        let mut headers = self.row.headers.names.clone();
        headers.push(VALID_FIELD.to_string());
        headers.push(REMARKS_FIELD.to_string());
        headers
    }
}

impl Serialize for ValidatedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.values.len() + 2))?;
        for (field, value) in self.row.iter() {
            map.serialize_entry(field, &value)?;
        }
        map.serialize_entry(VALID_FIELD, &self.valid)?;
        map.serialize_entry(REMARKS_FIELD, &self.remarks)?;
        map.end()
    }
}
