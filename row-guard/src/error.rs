//! Error types for the row-guard validation pipeline.
//!
//! Every failure that aborts a validation run is represented by [`GuardError`].
//! Row-level problems (a missing required field, a bad number, a duplicate key)
//! are *not* errors: they are recorded on the row as violations and never
//! surface through this type.

use thiserror::Error;

/// The main error type for row-guard.
#[derive(Error, Debug)]
pub enum GuardError {
    /// The input's declared content kind is neither a spreadsheet nor delimited text.
    #[error("Unsupported format: {content_type}")]
    UnsupportedFormat {
        /// The content type (or file name) that could not be mapped
        content_type: String,
    },

    /// A rule document failed to compile (bad regex, malformed structure).
    #[error("Invalid rule definition: {message}")]
    InvalidRuleDefinition { message: String },

    /// The referenced rule set does not exist in the rules store.
    #[error("No rules found for rules_ref={rules_ref}")]
    RulesNotFound { rules_ref: String },

    /// The blob store could not serve or accept an object.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The audit record store could not be updated.
    #[error("Persistence unavailable: {message}")]
    PersistenceUnavailable { message: String },

    /// Scheduling failed unexpectedly (a chunk panicked, the run was cancelled,
    /// or progress could not be reported).
    #[error("Pipeline aborted: {message}")]
    PipelineAborted { message: String },

    /// The input bytes could not be parsed as the declared kind.
    #[error("Source error ({kind}): {message}")]
    Source {
        /// Kind of source being read ("csv", "spreadsheet")
        kind: String,
        /// Detailed error message
        message: String,
    },

    /// A result artifact could not be produced.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from JSON serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, GuardError>`.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates an unsupported format error.
    pub fn unsupported_format(content_type: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }

    /// Creates an invalid rule definition error.
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRuleDefinition {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error with a source error.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a pipeline-aborted error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::PipelineAborted {
            message: message.into(),
        }
    }

    /// Creates a source (input parsing) error.
    pub fn input(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Returns the short machine-readable name of this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::UnsupportedFormat { .. } => "unsupported_format",
            GuardError::InvalidRuleDefinition { .. } => "invalid_rule_definition",
            GuardError::RulesNotFound { .. } => "rules_not_found",
            GuardError::StorageUnavailable { .. } => "storage_unavailable",
            GuardError::PersistenceUnavailable { .. } => "persistence_unavailable",
            GuardError::PipelineAborted { .. } => "pipeline_aborted",
            GuardError::Source { .. } => "source",
            GuardError::Artifact(_) => "artifact",
            GuardError::Configuration(_) => "configuration",
            GuardError::Serialization(_) => "serialization",
            GuardError::Io(_) => "io",
            GuardError::Internal(_) => "internal",
        }
    }
}

impl From<csv::Error> for GuardError {
    fn from(err: csv::Error) -> Self {
        GuardError::input("csv", err.to_string())
    }
}

impl From<calamine::Error> for GuardError {
    fn from(err: calamine::Error) -> Self {
        GuardError::input("spreadsheet", err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for GuardError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        GuardError::Artifact(err.to_string())
    }
}

impl From<object_store::Error> for GuardError {
    fn from(err: object_store::Error) -> Self {
        GuardError::storage_with_source(err.to_string(), Box::new(err))
    }
}

/// Extension trait for adding context to errors.
///
/// Collaborator failures keep their kind (the message gains the prefix);
/// everything else is folded into [`GuardError::Internal`].
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

fn add_context(msg: &str, err: GuardError) -> GuardError {
    match err {
        GuardError::StorageUnavailable { message, source } => GuardError::StorageUnavailable {
            message: format!("{msg}: {message}"),
            source,
        },
        GuardError::PersistenceUnavailable { message } => GuardError::PersistenceUnavailable {
            message: format!("{msg}: {message}"),
        },
        GuardError::Internal(inner) => GuardError::Internal(format!("{msg}: {inner}")),
        other => GuardError::Internal(format!("{msg}: {other}")),
    }
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<GuardError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| add_context(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| add_context(&f(), e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_unsupported_format_error() {
        let err = GuardError::unsupported_format("application/pdf");
        assert_eq!(err.to_string(), "Unsupported format: application/pdf");
        assert_eq!(err.kind(), "unsupported_format");
    }

    #[test]
    fn test_rules_not_found_error() {
        let err = GuardError::RulesNotFound {
            rules_ref: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "No rules found for rules_ref=abc");
    }

    #[test]
    fn test_storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "bucket missing");
        let err = GuardError::storage_with_source("fetch failed", Box::new(source));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Storage unavailable: fetch failed");
    }

    #[test]
    fn test_context_keeps_collaborator_kind() {
        fn failing_fetch() -> Result<()> {
            Err(GuardError::storage("timeout"))
        }

        let err = failing_fetch().context("reading input").unwrap_err();
        assert!(matches!(err, GuardError::StorageUnavailable { .. }));
        assert_eq!(err.to_string(), "Storage unavailable: reading input: timeout");
    }

    #[test]
    fn test_context_wraps_other_errors() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        ));
        let err = io.with_context(|| "writing report".to_string()).unwrap_err();
        assert!(matches!(err, GuardError::Internal(_)));
        assert!(err.to_string().contains("writing report"));
    }
}
