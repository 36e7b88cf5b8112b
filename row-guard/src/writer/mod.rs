//! Result artifacts: a formatted workbook and a raw JSON array.
//!
//! Every validated row falls into one of three [`RowClass`]es, which drive the
//! workbook's row colours:
//!
//! | Class           | Rule                                       | Fill      |
//! |-----------------|--------------------------------------------|-----------|
//! | `Success`       | no violations                              | green     |
//! | `SoftFail`      | violations, none mentioning "duplicate"    | yellow    |
//! | `DuplicateFail` | remarks mention "duplicate" (any case)     | red       |

use crate::core::ValidatedRow;
use crate::error::Result;
use tracing::debug;

mod json;
mod spreadsheet;

/// Visual class of a validated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowClass {
    Success,
    SoftFail,
    DuplicateFail,
}

impl RowClass {
    /// All classes, in legend order.
    pub const ALL: [RowClass; 3] = [RowClass::Success, RowClass::SoftFail, RowClass::DuplicateFail];

    /// Classifies a row. Duplicate wins over any other failure.
    pub fn classify(row: &ValidatedRow) -> Self {
        if row.remarks().to_lowercase().contains("duplicate") {
            RowClass::DuplicateFail
        } else if !row.is_success() {
            RowClass::SoftFail
        } else {
            RowClass::Success
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RowClass::Success => "Success",
            RowClass::SoftFail => "Warning",
            RowClass::DuplicateFail => "Duplicate",
        }
    }

    pub fn color_name(&self) -> &'static str {
        match self {
            RowClass::Success => "Light Green",
            RowClass::SoftFail => "Yellow",
            RowClass::DuplicateFail => "Red",
        }
    }

    pub fn meaning(&self) -> &'static str {
        match self {
            RowClass::Success => "Row passed all validations.",
            RowClass::SoftFail => "Field type/regex/required validation failed.",
            RowClass::DuplicateFail => "Duplicate based on unique constraints.",
        }
    }

    /// `(fill, font)` colours as `0xRRGGBB`.
    pub fn colors(&self) -> (u32, u32) {
        match self {
            RowClass::Success => (0xC6EFCE, 0x006100),
            RowClass::SoftFail => (0xFFF2CC, 0x9C6500),
            RowClass::DuplicateFail => (0xF4CCCC, 0x9C0006),
        }
    }
}

/// The two serialized outputs of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// `.xlsx` workbook bytes
    pub spreadsheet: Vec<u8>,
    /// Pretty-printed JSON array bytes
    pub json: Vec<u8>,
}

/// Writes validated rows to [`Artifacts`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultWriter;

impl ResultWriter {
    pub fn new() -> Self {
        Self
    }

    /// Serializes the rows. Returns `Ok(None)` for an empty slice.
    ///
    /// Output headers are the first row's headers followed by `Valid` and
    /// `Remarks`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GuardError::Artifact`] if the workbook cannot be
    /// built (e.g. more rows than a worksheet holds).
    pub fn write(&self, rows: &[ValidatedRow]) -> Result<Option<Artifacts>> {
        let Some(first) = rows.first() else {
            debug!("No rows to write, skipping artifacts");
            return Ok(None);
        };
        let headers = first.output_headers();

        let spreadsheet = spreadsheet::render(&headers, rows)?;
        let json = json::render(rows)?;
        debug!(
            rows = rows.len(),
            spreadsheet_bytes = spreadsheet.len(),
            json_bytes = json.len(),
            "Artifacts written"
        );

        Ok(Some(Artifacts { spreadsheet, json }))
    }
}
