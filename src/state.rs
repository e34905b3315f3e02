//! Application State
//!
//! Everything that outlives a single recomputation lives in [`AppState`]:
//! the configuration, the compiled normalizer and the raw table cache. Filter
//! parameters arrive as one [`FilterParams`] value per request.

use crate::config::EngineConfig;
use crate::engine::{join_tables, BucketSelection, JoinMode, Normalizer, Predicate, TableRole, TextField, WorkingTable};
use crate::error::Result;
use crate::ingestion::TableCache;
use crate::report::{self, DeadStockOutcome, ReportOutcome};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// User-chosen filters for one recomputation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Keep these categories; empty (or "All") keeps every category
    pub categories: Vec<String>,
    pub excluded_categories: Vec<String>,
    pub buckets: BucketSelection,
    pub name_search: Option<String>,
    pub identifier_search: Option<String>,
    /// Restrict totals to one period label
    pub period: Option<String>,
}

impl FilterParams {
    /// Predicates implied by these parameters; blank inputs contribute none
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        let selected = trimmed_labels(&self.categories);
        if !selected.is_empty() && !selected.iter().any(|c| c.eq_ignore_ascii_case("all")) {
            predicates.push(Predicate::CategoryIn(selected));
        }

        let excluded = trimmed_labels(&self.excluded_categories);
        if !excluded.is_empty() {
            predicates.push(Predicate::CategoryNotIn(excluded));
        }

        if let BucketSelection::Only(buckets) = &self.buckets {
            predicates.push(Predicate::GpBuckets(buckets.clone()));
        }

        let searches = [
            (TextField::Name, &self.name_search),
            (TextField::Identifier, &self.identifier_search),
        ];
        for (field, search) in searches {
            if let Some(needle) = search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                predicates.push(Predicate::TextContains {
                    field,
                    needle: needle.to_string(),
                });
            }
        }

        predicates
    }
}

fn trimmed_labels(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Source files behind one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSources {
    pub sales: PathBuf,
    /// Price / stock list joined against the sales sheet
    pub prices: Option<PathBuf>,
    /// Left side is the price list, right side the sales sheet
    #[serde(default)]
    pub join_mode: JoinMode,
}

impl ReportSources {
    pub fn sales_only(sales: impl Into<PathBuf>) -> Self {
        Self {
            sales: sales.into(),
            prices: None,
            join_mode: JoinMode::default(),
        }
    }

    pub fn with_prices(sales: impl Into<PathBuf>, prices: impl Into<PathBuf>, join_mode: JoinMode) -> Self {
        Self {
            sales: sales.into(),
            prices: Some(prices.into()),
            join_mode,
        }
    }
}

/// Explicit session state shared by consecutive recomputations
pub struct AppState {
    config: EngineConfig,
    normalizer: Normalizer,
    cache: TableCache,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let normalizer = Normalizer::from_config(&config)?;
        info!(
            missing_policy = ?config.missing_policy,
            ratio_fallback = ?config.ratio_fallback,
            "engine state initialised"
        );
        Ok(Self {
            config,
            normalizer,
            cache: TableCache::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// Normalized (and joined) base table; raw parsing is memoized, the rest is fresh
    pub fn base_table(&mut self, sources: &ReportSources) -> Result<WorkingTable> {
        let sales_raw = self.cache.load(&sources.sales)?;
        let sales = self.normalizer.normalize(&sales_raw, TableRole::Sales)?;

        match &sources.prices {
            Some(prices_path) => {
                let prices_raw = self.cache.load(prices_path)?;
                let prices = self.normalizer.normalize(&prices_raw, TableRole::PriceList)?;
                join_tables(&prices, &sales, sources.join_mode, &self.normalizer)
            }
            None => Ok(sales),
        }
    }

    /// Recompute the sales & profit report for one set of filters
    pub fn report(&mut self, sources: &ReportSources, filters: &FilterParams) -> Result<ReportOutcome> {
        let base = self.base_table(sources)?;
        report::build_report(&base, filters, &self.config)
    }

    /// Recompute the in-stock / zero-sales report
    pub fn dead_stock(&mut self, sources: &ReportSources, filters: &FilterParams) -> Result<DeadStockOutcome> {
        let base = self.base_table(sources)?;
        report::build_dead_stock(&base, filters, &self.config)
    }
}
