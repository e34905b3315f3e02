//! Report Assembly
//!
//! The presentation boundary. Everything here stays numeric until
//! [`display_table`] / [`groups_table`], which are the only places values
//! become formatted strings.

use crate::config::EngineConfig;
use crate::engine::{
    apply_predicates, f64_values, str_values, Aggregator, BucketCount, GroupSummary,
    MetricDeriver, Predicate, WorkingTable,
};
use crate::error::{ReportError, Result};
use crate::schema::{
    period_profit_column, period_sales_column, Field, CATEGORY, COST, GROSS_PROFIT_RATIO,
    IDENTIFIER, NAME, PRODUCT_MARGIN_RATIO, SELLING_PRICE, STOCK_QUANTITY, TOTAL_PROFIT,
    TOTAL_SALES,
};
use crate::state::FilterParams;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Missing values at the display boundary
pub const MISSING_MARKER: &str = "Nil";

/// Headline figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub total_sales: f64,
    pub total_profit: f64,
    /// Ratio of the summed totals
    pub gross_profit_ratio: Option<f64>,
    pub item_count: usize,
    /// Plain mean of per-item ratios; informational only
    pub mean_item_gross_profit_ratio: Option<f64>,
}

/// Chart-ready summaries of one report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub period: Option<String>,
    pub key_metrics: KeyMetrics,
    pub categories: Vec<GroupSummary>,
    pub grand_total: GroupSummary,
    pub periods: Vec<GroupSummary>,
    pub buckets: Vec<BucketCount>,
}

/// Filtered items plus their summaries
#[derive(Debug, Clone)]
pub struct Report {
    /// Item rows, highest total sales first
    pub items: WorkingTable,
    pub summary: ReportSummary,
}

/// Result of a report request; no matches is not an error
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Ready(Report),
    NoMatches,
}

impl ReportOutcome {
    pub fn report(&self) -> Option<&Report> {
        match self {
            ReportOutcome::Ready(report) => Some(report),
            ReportOutcome::NoMatches => None,
        }
    }
}

/// Items in stock that did not sell
#[derive(Debug, Clone)]
pub struct DeadStockReport {
    /// Item rows, largest stock first
    pub items: WorkingTable,
    pub item_count: usize,
    /// Sum of stock x selling price
    pub stock_value: f64,
}

#[derive(Debug, Clone)]
pub enum DeadStockOutcome {
    Ready(DeadStockReport),
    NoMatches,
}

fn sort_descending(table: &WorkingTable, column: &str) -> Result<WorkingTable> {
    let frame = table
        .frame
        .clone()
        .lazy()
        .sort_by_exprs(
            [col(column)],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true),
        )
        .collect()?;
    Ok(table.with_frame(frame))
}

/// Derive, filter and aggregate one report from a normalized base table
pub fn build_report(
    base: &WorkingTable,
    filters: &FilterParams,
    config: &EngineConfig,
) -> Result<ReportOutcome> {
    let deriver = MetricDeriver::new(config.ratio_fallback);
    let derived = deriver.derive_for(base, filters.period.as_deref())?;

    let predicates = filters.predicates();
    let filtered = derived.with_frame(apply_predicates(&derived.frame, &predicates)?);
    if filtered.is_empty() {
        info!(predicates = predicates.len(), "no items match the selected filters");
        return Ok(ReportOutcome::NoMatches);
    }

    let aggregator = Aggregator::new(config.ratio_fallback);
    let categories = aggregator.by_category(&filtered)?;
    let grand_total = aggregator.grand_total(&categories);
    let periods = aggregator.by_period(&filtered)?;
    let buckets = aggregator.bucket_distribution(&filtered)?;

    let item_ratios: Vec<f64> = filtered
        .f64_values(GROSS_PROFIT_RATIO)?
        .into_iter()
        .flatten()
        .collect();
    let mean_item_gross_profit_ratio = if item_ratios.is_empty() {
        None
    } else {
        Some(item_ratios.iter().sum::<f64>() / item_ratios.len() as f64)
    };

    let key_metrics = KeyMetrics {
        total_sales: grand_total.total_sales,
        total_profit: grand_total.total_profit,
        gross_profit_ratio: grand_total.gross_profit_ratio,
        item_count: filtered.height(),
        mean_item_gross_profit_ratio,
    };

    info!(
        items = key_metrics.item_count,
        categories = categories.len(),
        total_sales = key_metrics.total_sales,
        "built report"
    );

    Ok(ReportOutcome::Ready(Report {
        items: sort_descending(&filtered, TOTAL_SALES)?,
        summary: ReportSummary {
            generated_at: Utc::now(),
            period: filters.period.clone(),
            key_metrics,
            categories,
            grand_total,
            periods,
            buckets,
        },
    }))
}

/// Items with stock on hand and zero sales, plus their tied-up stock value
pub fn build_dead_stock(
    base: &WorkingTable,
    filters: &FilterParams,
    config: &EngineConfig,
) -> Result<DeadStockOutcome> {
    for field in [Field::StockQuantity, Field::SellingPrice] {
        if !base.layout.has(field) {
            return Err(ReportError::MissingColumn {
                table: "price list".to_string(),
                field: field.to_string(),
            });
        }
    }

    let derived = MetricDeriver::new(config.ratio_fallback).derive_for(base, filters.period.as_deref())?;

    let mut predicates = filters.predicates();
    predicates.push(Predicate::InStockWithoutSales);
    let filtered = derived.with_frame(apply_predicates(&derived.frame, &predicates)?);
    if filtered.is_empty() {
        return Ok(DeadStockOutcome::NoMatches);
    }

    let stock = filtered.f64_values(STOCK_QUANTITY)?;
    let selling = filtered.f64_values(SELLING_PRICE)?;
    let stock_value = stock
        .iter()
        .zip(selling.iter())
        .filter_map(|(s, p)| Some((*s)? * (*p)?))
        .sum();

    Ok(DeadStockOutcome::Ready(DeadStockReport {
        item_count: filtered.height(),
        stock_value,
        items: sort_descending(&filtered, STOCK_QUANTITY)?,
    }))
}

/// `1234567.891` -> `1,234,567.89`
pub fn format_amount(value: Option<f64>, decimals: usize) -> String {
    let Some(value) = value else {
        return MISSING_MARKER.to_string();
    };

    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (formatted.clone(), None),
    };

    let grouped = integer
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .join(",");

    let sign = if value < 0.0 && value.abs() >= 0.5 * 10f64.powi(-(decimals as i32)) {
        "-"
    } else {
        ""
    };

    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}

/// `0.1234` -> `12.34%`
pub fn format_ratio(value: Option<f64>) -> String {
    match value {
        Some(ratio) => format!("{:.2}%", ratio * 100.0),
        None => MISSING_MARKER.to_string(),
    }
}

fn text_column(header: &str, values: Vec<Option<String>>) -> Series {
    let values: Vec<String> = values
        .into_iter()
        .map(|v| v.unwrap_or_else(|| MISSING_MARKER.to_string()))
        .collect();
    Series::new(header, values)
}

fn formatted_column(
    df: &DataFrame,
    column: &str,
    header: &str,
    format: impl Fn(Option<f64>) -> String,
) -> Result<Series> {
    let values: Vec<String> = f64_values(df, column)?.into_iter().map(format).collect();
    Ok(Series::new(header, values))
}

/// Item table with display formatting applied
pub fn display_table(table: &WorkingTable) -> Result<DataFrame> {
    let df = &table.frame;
    let amount = |v: Option<f64>| format_amount(v, 2);
    let quantity = |v: Option<f64>| format_amount(v, 0);

    let mut columns = vec![
        text_column("Item Code", str_values(df, IDENTIFIER)?),
        text_column("Item Name", str_values(df, NAME)?),
        text_column("Category", str_values(df, CATEGORY)?),
    ];

    if table.layout.has(Field::Cost) {
        columns.push(formatted_column(df, COST, "Cost", amount)?);
    }
    if table.layout.has(Field::SellingPrice) {
        columns.push(formatted_column(df, SELLING_PRICE, "Selling", amount)?);
    }
    if table.layout.has(Field::StockQuantity) {
        columns.push(formatted_column(df, STOCK_QUANTITY, "Stock", quantity)?);
    }

    columns.push(formatted_column(df, TOTAL_SALES, "Total Sales", amount)?);
    columns.push(formatted_column(df, TOTAL_PROFIT, "Total Profit", amount)?);
    columns.push(formatted_column(df, GROSS_PROFIT_RATIO, "GP %", format_ratio)?);
    if df.column(PRODUCT_MARGIN_RATIO).is_ok() {
        columns.push(formatted_column(df, PRODUCT_MARGIN_RATIO, "Margin %", format_ratio)?);
    }

    for label in &table.layout.periods {
        columns.push(formatted_column(
            df,
            &period_sales_column(label),
            &format!("{} Total Sales", label),
            amount,
        )?);
        columns.push(formatted_column(
            df,
            &period_profit_column(label),
            &format!("{} Total Profit", label),
            amount,
        )?);
    }

    Ok(DataFrame::new(columns)?)
}

/// Summary rows (categories, periods) with display formatting applied
pub fn groups_table(key_header: &str, groups: &[GroupSummary]) -> Result<DataFrame> {
    let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
    let sales: Vec<String> = groups.iter().map(|g| format_amount(Some(g.total_sales), 2)).collect();
    let profit: Vec<String> = groups.iter().map(|g| format_amount(Some(g.total_profit), 2)).collect();
    let ratios: Vec<String> = groups.iter().map(|g| format_ratio(g.gross_profit_ratio)).collect();
    let counts: Vec<u64> = groups.iter().map(|g| g.item_count as u64).collect();

    Ok(DataFrame::new(vec![
        Series::new(key_header, keys),
        Series::new("Total Sales", sales),
        Series::new("Total Profit", profit),
        Series::new("GP %", ratios),
        Series::new("Items", counts),
    ])?)
}
