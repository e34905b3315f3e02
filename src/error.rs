use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Missing required column '{field}' in {table} table")]
    MissingColumn { table: String, field: String },

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl ReportError {
    /// The source could not be read at all (missing file, unparsable sheet).
    pub fn is_load_failure(&self) -> bool {
        matches!(self, ReportError::SourceNotFound(_) | ReportError::Load(_))
    }

    /// The source was read but lacks a column the engine cannot default.
    pub fn is_structural(&self) -> bool {
        matches!(self, ReportError::MissingColumn { .. })
    }
}

impl From<polars::error::PolarsError> for ReportError {
    fn from(err: polars::error::PolarsError) -> Self {
        ReportError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
