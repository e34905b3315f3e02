pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod report;
pub mod schema;
pub mod state;

pub use config::{EngineConfig, MissingPolicy, RatioFallback};
pub use error::{ReportError, Result};
pub use report::{DeadStockOutcome, Report, ReportOutcome};
pub use state::{AppState, FilterParams, ReportSources};
