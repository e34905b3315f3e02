//! Engine Configuration
//!
//! Serializable knobs for header matching, sentinels and the two missing-value
//! policies. Loaded from a JSON document, then optionally overridden from the
//! environment.

use crate::error::{ReportError, Result};
use crate::schema::{ColumnRule, Field, PeriodMetric, PeriodRule, SchemaRules};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ENV_MISSING_POLICY: &str = "GP_INSIGHTS_MISSING_POLICY";
pub const ENV_RATIO_FALLBACK: &str = "GP_INSIGHTS_RATIO_FALLBACK";
pub const ENV_UNKNOWN_LABEL: &str = "GP_INSIGHTS_UNKNOWN_LABEL";

/// How numeric cells with no source value are represented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Unmatched / empty numeric cells become 0
    #[default]
    ZeroFill,

    /// Unmatched numeric cells stay null and render as "Nil"
    ExplicitMissing,
}

impl FromStr for MissingPolicy {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zero_fill" | "zero-fill" | "zero" => Ok(MissingPolicy::ZeroFill),
            "explicit_missing" | "explicit-missing" | "missing" | "nil" => {
                Ok(MissingPolicy::ExplicitMissing)
            }
            other => Err(ReportError::InvalidParameter(format!(
                "Unknown missing policy: {}",
                other
            ))),
        }
    }
}

/// Value a ratio takes when its denominator is zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioFallback {
    /// "No profit": the ratio reads 0%
    #[default]
    Zero,

    /// "No data": the ratio is null
    Missing,
}

impl RatioFallback {
    pub fn value(self) -> Option<f64> {
        match self {
            RatioFallback::Zero => Some(0.0),
            RatioFallback::Missing => None,
        }
    }

    /// Fallback as a Float64 literal expression
    pub fn literal(self) -> Expr {
        match self {
            RatioFallback::Zero => lit(0.0),
            RatioFallback::Missing => Expr::Literal(LiteralValue::Null).cast(DataType::Float64),
        }
    }
}

impl FromStr for RatioFallback {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zero" | "0" => Ok(RatioFallback::Zero),
            "missing" | "nil" | "null" => Ok(RatioFallback::Missing),
            other => Err(ReportError::InvalidParameter(format!(
                "Unknown ratio fallback: {}",
                other
            ))),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub identifier_aliases: Vec<String>,
    pub name_aliases: Vec<String>,
    pub category_aliases: Vec<String>,
    pub cost_aliases: Vec<String>,
    pub selling_price_aliases: Vec<String>,
    pub stock_aliases: Vec<String>,

    /// Regex with a `period` group, e.g. "Jul-2025 Total Sales"
    pub sales_pattern: String,
    pub profit_pattern: String,

    /// Sentinel for absent name / category
    pub unknown_label: String,

    pub missing_policy: MissingPolicy,
    pub ratio_fallback: RatioFallback,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identifier_aliases: strings(&["Item Bar Code", "Item Code", "Barcode", "Identifier"]),
            name_aliases: strings(&["Item Name", "Name"]),
            category_aliases: strings(&["Category"]),
            cost_aliases: strings(&["Cost"]),
            selling_price_aliases: strings(&["Selling", "Selling Price", "Price"]),
            stock_aliases: strings(&["Stock", "Stock Quantity"]),
            sales_pattern: r"^(?P<period>.+?)\s+Total Sales$".to_string(),
            profit_pattern: r"^(?P<period>.+?)\s+Total Profit$".to_string(),
            unknown_label: "Unknown".to_string(),
            missing_policy: MissingPolicy::default(),
            ratio_fallback: RatioFallback::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; absent keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Apply `GP_INSIGHTS_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var(ENV_MISSING_POLICY) {
            self.missing_policy = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_RATIO_FALLBACK) {
            self.ratio_fallback = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_UNKNOWN_LABEL) {
            if !value.trim().is_empty() {
                self.unknown_label = value.trim().to_string();
            }
        }
        Ok(self)
    }

    /// Compile the header matching rules
    pub fn schema_rules(&self) -> Result<SchemaRules> {
        let columns = vec![
            ColumnRule { field: Field::Identifier, aliases: self.identifier_aliases.clone() },
            ColumnRule { field: Field::Name, aliases: self.name_aliases.clone() },
            ColumnRule { field: Field::Category, aliases: self.category_aliases.clone() },
            ColumnRule { field: Field::Cost, aliases: self.cost_aliases.clone() },
            ColumnRule { field: Field::SellingPrice, aliases: self.selling_price_aliases.clone() },
            ColumnRule { field: Field::StockQuantity, aliases: self.stock_aliases.clone() },
        ];

        if self.identifier_aliases.is_empty() {
            return Err(ReportError::Config("identifier_aliases must not be empty".to_string()));
        }

        let periods = vec![
            PeriodRule::new(PeriodMetric::Sales, &self.sales_pattern)?,
            PeriodRule::new(PeriodMetric::Profit, &self.profit_pattern)?,
        ];

        Ok(SchemaRules { columns, periods })
    }
}
