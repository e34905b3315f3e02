//! Predicate Filter
//!
//! Independent predicates over the derived working table. They compose by
//! logical AND, so the order they are given in never changes the result.

use crate::error::{ReportError, Result};
use crate::schema::{
    CATEGORY, GROSS_PROFIT_RATIO, IDENTIFIER, NAME, STOCK_QUANTITY, TOTAL_SALES,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// `12.34%` is a ratio of `0.1234`
const RATIO_DECIMALS: u32 = 4;

/// Fixed partition of the gross-profit ratio.
///
/// Intervals are half-open with the lower bound inclusive; the top bucket is
/// unbounded above and the bottom one unbounded below. Ratios are bucketed as
/// displayed, i.e. rounded to two decimals of a percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GpBucket {
    #[serde(rename = "<5%")]
    Below5,
    #[serde(rename = "5-10%")]
    From5To10,
    #[serde(rename = "10-20%")]
    From10To20,
    #[serde(rename = "20-30%")]
    From20To30,
    #[serde(rename = "30%+")]
    From30,
}

impl GpBucket {
    pub const ALL: [GpBucket; 5] = [
        GpBucket::Below5,
        GpBucket::From5To10,
        GpBucket::From10To20,
        GpBucket::From20To30,
        GpBucket::From30,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GpBucket::Below5 => "<5%",
            GpBucket::From5To10 => "5-10%",
            GpBucket::From10To20 => "10-20%",
            GpBucket::From20To30 => "20-30%",
            GpBucket::From30 => "30%+",
        }
    }

    /// (inclusive lower, exclusive upper) bounds as ratios
    pub fn bounds(self) -> (Option<f64>, Option<f64>) {
        match self {
            GpBucket::Below5 => (None, Some(0.05)),
            GpBucket::From5To10 => (Some(0.05), Some(0.10)),
            GpBucket::From10To20 => (Some(0.10), Some(0.20)),
            GpBucket::From20To30 => (Some(0.20), Some(0.30)),
            GpBucket::From30 => (Some(0.30), None),
        }
    }

    pub fn contains(self, ratio: f64) -> bool {
        let ratio = (ratio * 10f64.powi(RATIO_DECIMALS as i32)).round() / 10f64.powi(RATIO_DECIMALS as i32);
        let (lower, upper) = self.bounds();
        lower.map_or(true, |lo| ratio >= lo) && upper.map_or(true, |hi| ratio < hi)
    }

    /// Bucket of a ratio; `None` only for NaN
    pub fn classify(ratio: f64) -> Option<GpBucket> {
        GpBucket::ALL.into_iter().find(|bucket| bucket.contains(ratio))
    }

    /// Membership expression over `gross_profit_ratio`; null ratios never match
    pub fn expr(self) -> Expr {
        let (lower, upper) = self.bounds();
        let ratio = col(GROSS_PROFIT_RATIO).round(RATIO_DECIMALS);
        match (lower, upper) {
            (Some(lo), Some(hi)) => ratio.clone().gt_eq(lit(lo)).and(ratio.lt(lit(hi))),
            (Some(lo), None) => ratio.gt_eq(lit(lo)),
            (None, Some(hi)) => ratio.lt(lit(hi)),
            (None, None) => ratio.is_not_null(),
        }
    }
}

impl fmt::Display for GpBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GpBucket {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.as_str() {
            "<5%" | "<5" => Ok(GpBucket::Below5),
            "5-10%" | "5-10" => Ok(GpBucket::From5To10),
            "10-20%" | "10-20" => Ok(GpBucket::From10To20),
            "20-30%" | "20-30" => Ok(GpBucket::From20To30),
            "30%+" | ">=30%" | "30+" => Ok(GpBucket::From30),
            _ => Err(ReportError::InvalidParameter(format!("Unknown GP bucket: {}", s))),
        }
    }
}

/// Bucket filter setting; `All` short-circuits to no filtering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSelection {
    #[default]
    All,
    Only(Vec<GpBucket>),
}

impl BucketSelection {
    /// Parse dashboard labels; any "All" selects everything
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        if labels.is_empty() || labels.iter().any(|l| l.as_ref().trim().eq_ignore_ascii_case("all")) {
            return Ok(BucketSelection::All);
        }
        let buckets = labels
            .iter()
            .map(|l| l.as_ref().parse())
            .collect::<Result<Vec<GpBucket>>>()?;
        Ok(BucketSelection::Only(buckets))
    }
}

/// Text columns searchable by substring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Name,
    Identifier,
}

impl TextField {
    pub fn column(self) -> &'static str {
        match self {
            TextField::Name => NAME,
            TextField::Identifier => IDENTIFIER,
        }
    }
}

/// One inclusion / exclusion rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Category equals any of the values
    CategoryIn(Vec<String>),

    /// Category equals none of the values
    CategoryNotIn(Vec<String>),

    /// Case-insensitive substring match; null cells never match
    TextContains { field: TextField, needle: String },

    /// Gross-profit ratio falls into any of the buckets
    GpBuckets(Vec<GpBucket>),

    /// Stock on hand but no sales in the selected periods; a missing total counts as no sales
    InStockWithoutSales,
}

fn string_set(values: &[String]) -> Expr {
    lit(Series::new("values", values))
}

impl Predicate {
    pub fn expr(&self) -> Expr {
        match self {
            Predicate::CategoryIn(values) => col(CATEGORY).is_in(string_set(values)),
            Predicate::CategoryNotIn(values) => col(CATEGORY).is_in(string_set(values)).not(),
            Predicate::TextContains { field, needle } => col(field.column())
                .str()
                .to_lowercase()
                .str()
                .contains_literal(lit(needle.to_lowercase()))
                .fill_null(lit(false)),
            Predicate::GpBuckets(buckets) => buckets
                .iter()
                .map(|b| b.expr())
                .reduce(|acc, expr| acc.or(expr))
                .unwrap_or_else(|| lit(false)),
            Predicate::InStockWithoutSales => col(STOCK_QUANTITY)
                .gt(lit(0.0))
                .and(col(TOTAL_SALES).fill_null(lit(0.0)).eq(lit(0.0))),
        }
    }
}

/// Apply predicates with AND semantics. An empty result is a valid outcome.
pub fn apply_predicates(frame: &DataFrame, predicates: &[Predicate]) -> Result<DataFrame> {
    let combined = predicates
        .iter()
        .map(Predicate::expr)
        .reduce(|acc, expr| acc.and(expr));

    let filtered = match combined {
        Some(expr) => frame.clone().lazy().filter(expr.fill_null(lit(false))).collect()?,
        None => frame.clone(),
    };

    debug!(
        predicates = predicates.len(),
        rows_in = frame.height(),
        rows_out = filtered.height(),
        "applied predicates"
    );

    Ok(filtered)
}
