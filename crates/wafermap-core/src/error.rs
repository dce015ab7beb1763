use std::path::PathBuf;

use thiserror::Error;
use wafermap_parser::ReportError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no result files matching code '{code}' under {}", .root.display())]
    NoMatchingCode { code: String, root: PathBuf },

    #[error(
        "results were not found for all {expected} expected ASICs: \
         baseline files matched {baseline}, elevated files matched {elevated}"
    )]
    Coverage {
        expected: usize,
        baseline: usize,
        elevated: usize,
        missing_baseline: Vec<String>,
        missing_elevated: Vec<String>,
    },

    #[error("failed to extract {}: {source}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: ReportError,
    },

    #[error("serial '{serial}' appears more than once in table '{key}'")]
    DuplicateSerial { key: String, serial: String },

    #[error(
        "baseline and elevated test keys do not match \
         (baseline only: {baseline_only:?}, elevated only: {elevated_only:?})"
    )]
    DatasetMismatch {
        baseline_only: Vec<String>,
        elevated_only: Vec<String>,
    },

    #[error("invalid discovery pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("die grid error: {0}")]
    Grid(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
