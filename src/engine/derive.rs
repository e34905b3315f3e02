//! Metric Deriver
//!
//! Appends `total_sales`, `total_profit`, `gross_profit_ratio` and (when the
//! table carries cost and selling price) `product_margin_ratio`. Derived
//! columns are overwritten on every run, so deriving twice equals deriving once.

use crate::config::RatioFallback;
use crate::engine::WorkingTable;
use crate::error::{ReportError, Result};
use crate::schema::{
    period_profit_column, period_sales_column, Field, COST, GROSS_PROFIT_RATIO,
    PRODUCT_MARGIN_RATIO, SELLING_PRICE, TOTAL_PROFIT, TOTAL_SALES,
};
use polars::prelude::*;

/// `numerator / denominator`, with the zero-denominator guard evaluated first.
/// A missing denominator takes the fallback as well.
pub fn ratio_expr(numerator: Expr, denominator: Expr, fallback: RatioFallback) -> Expr {
    when(denominator.clone().is_null().or(denominator.clone().eq(lit(0.0))))
        .then(fallback.literal())
        .otherwise(numerator / denominator)
}

/// Scalar form of [`ratio_expr`] used for group and grand totals
pub fn guarded_ratio(numerator: f64, denominator: f64, fallback: RatioFallback) -> Option<f64> {
    if denominator == 0.0 {
        return fallback.value();
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        Some(ratio)
    } else {
        fallback.value()
    }
}

/// Per-row metric derivation
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricDeriver {
    pub fallback: RatioFallback,
}

impl MetricDeriver {
    pub fn new(fallback: RatioFallback) -> Self {
        Self { fallback }
    }

    /// Derive totals over every period of the table
    pub fn derive(&self, table: &WorkingTable) -> Result<WorkingTable> {
        self.derive_for(table, None)
    }

    /// Derive totals over one selected period, or all periods when `None`
    pub fn derive_for(&self, table: &WorkingTable, period: Option<&str>) -> Result<WorkingTable> {
        let labels: Vec<&str> = match period {
            Some(label) if table.layout.has_period(label) => vec![label],
            Some(label) => return Err(ReportError::UnknownPeriod(label.to_string())),
            None => table.layout.periods.iter().map(String::as_str).collect(),
        };

        let total_sales = row_sum(labels.iter().map(|l| period_sales_column(l)));
        let total_profit = row_sum(labels.iter().map(|l| period_profit_column(l)));

        let mut lf = table
            .frame
            .clone()
            .lazy()
            .with_columns([total_sales.alias(TOTAL_SALES), total_profit.alias(TOTAL_PROFIT)])
            .with_column(
                ratio_expr(col(TOTAL_PROFIT), col(TOTAL_SALES), self.fallback).alias(GROSS_PROFIT_RATIO),
            );

        if table.layout.has(Field::Cost) && table.layout.has(Field::SellingPrice) {
            // selling / cost - 1, zero-cost items read 0
            lf = lf.with_column(
                ratio_expr(col(SELLING_PRICE) - col(COST), col(COST), RatioFallback::Zero)
                    .alias(PRODUCT_MARGIN_RATIO),
            );
        }

        Ok(table.with_frame(lf.collect()?))
    }
}

/// Row-wise sum; no columns means a total of 0
fn row_sum(columns: impl Iterator<Item = String>) -> Expr {
    columns
        .map(|c| col(&c))
        .reduce(|acc, expr| acc + expr)
        .unwrap_or_else(|| lit(0.0))
}
