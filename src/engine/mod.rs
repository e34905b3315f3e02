//! Metric & Filter Engine
//!
//! raw table(s) -> normalize -> join -> derive -> filter -> aggregate.
//! Every stage takes its input by reference and returns a fresh frame.

pub mod aggregate;
pub mod derive;
pub mod filter;
pub mod join;
pub mod normalize;

use crate::error::Result;
use crate::schema::TableLayout;
use polars::prelude::*;

pub use aggregate::{Aggregator, BucketCount, GroupSummary};
pub use derive::{guarded_ratio, ratio_expr, MetricDeriver};
pub use filter::{apply_predicates, BucketSelection, GpBucket, Predicate, TextField};
pub use join::{join_tables, JoinMode};
pub use normalize::{Normalizer, TableRole};

/// A normalized frame together with its canonical layout
#[derive(Debug, Clone)]
pub struct WorkingTable {
    pub frame: DataFrame,
    pub layout: TableLayout,
}

impl WorkingTable {
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Same layout, different rows
    pub fn with_frame(&self, frame: DataFrame) -> Self {
        Self {
            frame,
            layout: self.layout.clone(),
        }
    }

    /// Values of a Float64 column, nulls preserved
    pub fn f64_values(&self, column: &str) -> Result<Vec<Option<f64>>> {
        f64_values(&self.frame, column)
    }
}

pub(crate) fn f64_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    Ok(df
        .column(column)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect())
}

pub(crate) fn str_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    Ok(df
        .column(column)?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}
