//! Record sources: turn raw upload bytes into an ordered sequence of [`Row`]s.
//!
//! Two content kinds are supported:
//!
//! - **Spreadsheets** (`.xlsx` and friends), read from the first worksheet
//! - **Delimited text** (CSV, TSV, semicolon or pipe separated), with the
//!   delimiter detected from a sample of the content
//!
//! Headers are always taken from the first row, trimmed and lowercased.
//!
//! # Examples
//!
//! ```rust
//! use row_guard::sources::{ContentKind, RecordSource};
//!
//! # fn example() -> row_guard::error::Result<()> {
//! let bytes = b"Email;Age\na@x.com;30\n".to_vec();
//! let kind = ContentKind::from_content_type("text/csv")?;
//! let rows = RecordSource::open(bytes, kind)?.collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::core::{Headers, Row};
use crate::error::{GuardError, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

mod delimited;
mod spreadsheet;

pub use delimited::{sniff_delimiter, CANDIDATE_DELIMITERS, SNIFF_SAMPLE_CHARS};

/// Declared kind of an upload's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// An Excel workbook
    Spreadsheet,
    /// CSV-like text with an auto-detected delimiter
    DelimitedText,
}

impl ContentKind {
    /// Maps a MIME content type to a content kind.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::UnsupportedFormat`] for anything that is neither a
    /// spreadsheet nor delimited text.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("spreadsheetml") || lowered.contains("ms-excel") {
            Ok(ContentKind::Spreadsheet)
        } else if lowered.contains("csv")
            || lowered.contains("tab-separated-values")
            || lowered.starts_with("text/plain")
        {
            Ok(ContentKind::DelimitedText)
        } else {
            Err(GuardError::unsupported_format(content_type))
        }
    }

    /// Infers the content kind from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "xlsb" | "ods") => Ok(ContentKind::Spreadsheet),
            Some("csv" | "tsv" | "txt" | "psv") => Ok(ContentKind::DelimitedText),
            _ => Err(GuardError::unsupported_format(path.display().to_string())),
        }
    }

    /// The canonical MIME type for this kind.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentKind::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ContentKind::DelimitedText => "text/csv",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Spreadsheet => write!(f, "spreadsheet"),
            ContentKind::DelimitedText => write!(f, "delimited-text"),
        }
    }
}

/// A lazy, finite, ordered sequence of rows read from one upload.
pub struct Records {
    headers: Arc<Headers>,
    rows: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl Records {
    pub(crate) fn new(
        headers: Arc<Headers>,
        rows: Box<dyn Iterator<Item = Result<Row>> + Send>,
    ) -> Self {
        Self { headers, rows }
    }

    /// The headers read from the first row.
    pub fn headers(&self) -> &Arc<Headers> {
        &self.headers
    }
}

impl Iterator for Records {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("headers", &self.headers.names())
            .finish_non_exhaustive()
    }
}

/// Entry point for reading uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordSource;

impl RecordSource {
    /// Opens raw bytes of the given kind as a row sequence.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Source`] when the bytes cannot be parsed as the
    /// declared kind (e.g. a corrupt workbook).
    pub fn open(bytes: Vec<u8>, kind: ContentKind) -> Result<Records> {
        match kind {
            ContentKind::Spreadsheet => spreadsheet::open(bytes),
            ContentKind::DelimitedText => Ok(delimited::open(bytes)),
        }
    }

    /// Opens an upload described by its MIME content type.
    pub fn open_content_type(bytes: Vec<u8>, content_type: &str) -> Result<Records> {
        Self::open(bytes, ContentKind::from_content_type(content_type)?)
    }
}
