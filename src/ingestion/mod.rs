//! Ingestion - spreadsheet loading and raw table memoization

pub mod cache;
pub mod loader;

pub use cache::TableCache;
pub use loader::{load_table, SourceFormat};
