use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report declares unsupported encoding '{label}'")]
    UnknownEncoding { label: String },

    #[error("report is not valid {encoding} text")]
    Decode { encoding: &'static str },

    #[error("report is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("report is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("entry '{test}' is missing its Result field")]
    MissingTestResult { test: String },

    #[error("record value #{index} in '{test}' has no Record attribute")]
    UnnamedRecord { test: String, index: usize },

    #[error("invalid ProductSN '{value}': {reason}")]
    InvalidSerial { value: String, reason: String },

    #[error("boundary column '{column}' not found in '{test}'")]
    MissingBoundary { column: String, test: String },

    #[error("column '{column}' value '{value}' is not numeric")]
    InvalidMeasurement { column: String, value: String },

    #[error("no Detail entry matching test '{test}' / measurement '{measurement}'")]
    NoMatch { test: String, measurement: String },
}

impl ReportError {
    /// `NoMatch` only excludes the report from its table. Every other variant
    /// aborts the extraction step.
    pub fn is_no_match(&self) -> bool {
        matches!(self, ReportError::NoMatch { .. })
    }
}
