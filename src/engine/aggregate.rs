//! Aggregator
//!
//! Reduces a derived (and usually filtered) working table to group-level and
//! grand-total summaries. Group ratios are always recomputed from the summed
//! totals, never averaged from per-row ratios.

use crate::config::RatioFallback;
use crate::engine::derive::{guarded_ratio, ratio_expr};
use crate::engine::filter::GpBucket;
use crate::engine::{f64_values, str_values, WorkingTable};
use crate::error::Result;
use crate::schema::{
    period_profit_column, period_sales_column, CATEGORY, GROSS_PROFIT_RATIO, TOTAL_PROFIT,
    TOTAL_SALES,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const ITEM_COUNT: &str = "item_count";

/// One summary row: a category, a period, or the grand total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Category, period label, or "Total"
    pub key: String,
    pub total_sales: f64,
    pub total_profit: f64,
    pub gross_profit_ratio: Option<f64>,
    pub item_count: usize,
}

/// Histogram bar of the GP distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub bucket: GpBucket,
    pub item_count: usize,
}

/// Group and grand-total reductions
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    pub fallback: RatioFallback,
}

impl Aggregator {
    pub fn new(fallback: RatioFallback) -> Self {
        Self { fallback }
    }

    /// Sum totals per category, sorted by category
    pub fn by_category(&self, table: &WorkingTable) -> Result<Vec<GroupSummary>> {
        if table.is_empty() {
            return Ok(Vec::new());
        }

        let grouped = table
            .frame
            .clone()
            .lazy()
            .group_by([col(CATEGORY)])
            .agg([
                col(TOTAL_SALES).sum(),
                col(TOTAL_PROFIT).sum(),
                col(CATEGORY).count().alias(ITEM_COUNT),
            ])
            .with_column(
                ratio_expr(col(TOTAL_PROFIT), col(TOTAL_SALES), self.fallback).alias(GROSS_PROFIT_RATIO),
            )
            .collect()?;

        let keys = str_values(&grouped, CATEGORY)?;
        let sales = f64_values(&grouped, TOTAL_SALES)?;
        let profit = f64_values(&grouped, TOTAL_PROFIT)?;
        let ratios = f64_values(&grouped, GROSS_PROFIT_RATIO)?;
        let counts = f64_values(&grouped, ITEM_COUNT)?;

        let mut summaries: Vec<GroupSummary> = (0..grouped.height())
            .map(|i| GroupSummary {
                key: keys[i].clone().unwrap_or_default(),
                total_sales: sales[i].unwrap_or(0.0),
                total_profit: profit[i].unwrap_or(0.0),
                gross_profit_ratio: ratios[i],
                item_count: counts[i].unwrap_or(0.0) as usize,
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(summaries)
    }

    /// Sum each period's sales and profit across all rows, in period order
    pub fn by_period(&self, table: &WorkingTable) -> Result<Vec<GroupSummary>> {
        table
            .layout
            .periods
            .iter()
            .map(|label| {
                let total_sales = column_sum(table.f64_values(&period_sales_column(label))?);
                let total_profit = column_sum(table.f64_values(&period_profit_column(label))?);
                Ok(GroupSummary {
                    key: label.clone(),
                    total_sales,
                    total_profit,
                    gross_profit_ratio: guarded_ratio(total_profit, total_sales, self.fallback),
                    item_count: table.height(),
                })
            })
            .collect()
    }

    /// Grand total over a set of group rows
    pub fn grand_total(&self, groups: &[GroupSummary]) -> GroupSummary {
        let total_sales: f64 = groups.iter().map(|g| g.total_sales).sum();
        let total_profit: f64 = groups.iter().map(|g| g.total_profit).sum();
        GroupSummary {
            key: "Total".to_string(),
            total_sales,
            total_profit,
            gross_profit_ratio: guarded_ratio(total_profit, total_sales, self.fallback),
            item_count: groups.iter().map(|g| g.item_count).sum(),
        }
    }

    /// Item count per GP bucket, every bucket listed; null ratios are skipped
    pub fn bucket_distribution(&self, table: &WorkingTable) -> Result<Vec<BucketCount>> {
        let ratios = table.f64_values(GROSS_PROFIT_RATIO)?;
        Ok(GpBucket::ALL
            .into_iter()
            .map(|bucket| BucketCount {
                bucket,
                item_count: ratios
                    .iter()
                    .flatten()
                    .filter(|ratio| bucket.contains(**ratio))
                    .count(),
            })
            .collect())
    }
}

/// Null-skipping sum
fn column_sum(values: Vec<Option<f64>>) -> f64 {
    values.into_iter().flatten().sum()
}
