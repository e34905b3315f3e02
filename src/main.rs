use gp_insights::engine::{BucketSelection, JoinMode};
use gp_insights::report::{display_table, groups_table, format_amount, format_ratio, DeadStockOutcome, ReportOutcome};
use gp_insights::{AppState, EngineConfig, FilterParams, ReportSources};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gp-insights")]
#[command(about = "Sales, profit and gross-margin reports from item spreadsheets")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON engine configuration (column aliases, period patterns, policies)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Item table, category and period summaries, GP distribution
    Report {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Write the formatted item table to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the summary as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Items with stock on hand and no sales
    DeadStock {
        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Write the formatted item table to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Sales sheet (CSV or workbook)
    #[arg(long)]
    sales: PathBuf,

    /// Price / stock list joined on the item identifier
    #[arg(long)]
    prices: Option<PathBuf>,

    /// Row preservation when joining: left (price list), right (sales) or outer
    #[arg(long, default_value = "left")]
    join: JoinMode,
}

#[derive(Args)]
struct FilterArgs {
    /// Keep only these categories (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Drop these categories (repeatable)
    #[arg(long = "exclude")]
    excluded: Vec<String>,

    /// GP buckets to keep: "<5%", "5-10%", "10-20%", "20-30%", "30%+" or "All"
    #[arg(long = "bucket")]
    buckets: Vec<String>,

    #[arg(long)]
    search_name: Option<String>,

    #[arg(long)]
    search_id: Option<String>,

    /// Restrict totals to one period label, e.g. "Jul-2025"
    #[arg(long)]
    period: Option<String>,
}

impl SourceArgs {
    fn into_sources(self) -> ReportSources {
        match self.prices {
            Some(prices) => ReportSources::with_prices(self.sales, prices, self.join),
            None => ReportSources::sales_only(self.sales),
        }
    }
}

impl FilterArgs {
    fn into_params(self) -> Result<FilterParams> {
        Ok(FilterParams {
            categories: self.categories,
            excluded_categories: self.excluded,
            buckets: BucketSelection::from_labels(self.buckets.as_slice())?,
            name_search: self.search_name,
            identifier_search: self.search_id,
            period: self.period,
        })
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "gp_insights=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;

    let mut state = AppState::new(config)?;

    let outcome = match cli.command {
        Commands::Report { sources, filters, csv, json } => {
            run_report(&mut state, sources.into_sources(), filters.into_params()?, csv, json)
        }
        Commands::DeadStock { sources, filters, csv } => {
            run_dead_stock(&mut state, sources.into_sources(), filters.into_params()?, csv)
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn run_report(
    state: &mut AppState,
    sources: ReportSources,
    filters: FilterParams,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let outcome = state
        .report(&sources, &filters)
        .with_context(|| format!("building report from {}", sources.sales.display()))?;

    let report = match outcome {
        ReportOutcome::Ready(report) => report,
        ReportOutcome::NoMatches => {
            println!("No items match the selected filters.");
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
        return Ok(());
    }

    let metrics = &report.summary.key_metrics;
    println!("Total Sales:   {}", format_amount(Some(metrics.total_sales), 2));
    println!("Total Profit:  {}", format_amount(Some(metrics.total_profit), 2));
    println!("GP %:          {}", format_ratio(metrics.gross_profit_ratio));
    println!("Mean item GP:  {}", format_ratio(metrics.mean_item_gross_profit_ratio));
    println!("Items:         {}", metrics.item_count);
    println!();

    let mut categories = report.summary.categories.clone();
    categories.push(report.summary.grand_total.clone());
    println!("{}", groups_table("Category", &categories)?);

    if !report.summary.periods.is_empty() {
        println!("{}", groups_table("Period", &report.summary.periods)?);
    }

    for bucket in &report.summary.buckets {
        println!("{:>7}  {}", bucket.bucket.label(), bucket.item_count);
    }
    println!();

    let mut items = display_table(&report.items)?;
    println!("{}", items);

    if let Some(path) = csv {
        write_csv(&mut items, &path)?;
    }

    Ok(())
}

fn run_dead_stock(
    state: &mut AppState,
    sources: ReportSources,
    filters: FilterParams,
    csv: Option<PathBuf>,
) -> Result<()> {
    let outcome = state
        .dead_stock(&sources, &filters)
        .with_context(|| format!("building dead-stock report from {}", sources.sales.display()))?;

    let dead_stock = match outcome {
        DeadStockOutcome::Ready(report) => report,
        DeadStockOutcome::NoMatches => {
            println!("No items match the selected filters.");
            return Ok(());
        }
    };

    println!("Items in stock without sales: {}", dead_stock.item_count);
    println!("Stock value:                  {}", format_amount(Some(dead_stock.stock_value), 2));
    println!();

    let mut items = display_table(&dead_stock.items)?;
    println!("{}", items);

    if let Some(path) = csv {
        write_csv(&mut items, &path)?;
    }

    Ok(())
}

fn write_csv(df: &mut DataFrame, path: &PathBuf) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;
    info!(rows = df.height(), path = %path.display(), "wrote item table");
    Ok(())
}
