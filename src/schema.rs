//! Column Schema Rules
//!
//! Declarative mapping from spreadsheet headers to the semantic fields the
//! engine works with. Rules are compiled once from the [`EngineConfig`] and
//! evaluated once per ingested table; nothing downstream looks at raw header
//! names again.
//!
//! [`EngineConfig`]: crate::config::EngineConfig

use crate::error::{ReportError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Canonical column names of the working table
pub const IDENTIFIER: &str = "identifier";
pub const NAME: &str = "name";
pub const CATEGORY: &str = "category";
pub const COST: &str = "cost";
pub const SELLING_PRICE: &str = "selling_price";
pub const STOCK_QUANTITY: &str = "stock_quantity";
pub const TOTAL_SALES: &str = "total_sales";
pub const TOTAL_PROFIT: &str = "total_profit";
pub const GROSS_PROFIT_RATIO: &str = "gross_profit_ratio";
pub const PRODUCT_MARGIN_RATIO: &str = "product_margin_ratio";

/// Columns produced by the metric deriver
pub const DERIVED_COLUMNS: [&str; 4] = [
    TOTAL_SALES,
    TOTAL_PROFIT,
    GROSS_PROFIT_RATIO,
    PRODUCT_MARGIN_RATIO,
];

/// Semantic item fields recognised by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Identifier,
    Name,
    Category,
    Cost,
    SellingPrice,
    StockQuantity,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Identifier,
        Field::Name,
        Field::Category,
        Field::Cost,
        Field::SellingPrice,
        Field::StockQuantity,
    ];

    /// Column name of this field in the working table
    pub fn column(self) -> &'static str {
        match self {
            Field::Identifier => IDENTIFIER,
            Field::Name => NAME,
            Field::Category => CATEGORY,
            Field::Cost => COST,
            Field::SellingPrice => SELLING_PRICE,
            Field::StockQuantity => STOCK_QUANTITY,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Field::Cost | Field::SellingPrice | Field::StockQuantity)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Which half of a period metric a header carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodMetric {
    Sales,
    Profit,
}

/// Working-table column holding one period's sales
pub fn period_sales_column(label: &str) -> String {
    format!("sales[{}]", label)
}

/// Working-table column holding one period's profit
pub fn period_profit_column(label: &str) -> String {
    format!("profit[{}]", label)
}

/// Header aliases for one semantic field
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub field: Field,
    pub aliases: Vec<String>,
}

impl ColumnRule {
    fn matches(&self, header: &str) -> bool {
        self.aliases
            .iter()
            .any(|alias| alias.trim().eq_ignore_ascii_case(header))
    }
}

/// Header pattern for one period metric; must capture `period`
#[derive(Debug, Clone)]
pub struct PeriodRule {
    pub metric: PeriodMetric,
    pub pattern: Regex,
}

impl PeriodRule {
    pub fn new(metric: PeriodMetric, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ReportError::Config(format!("Invalid period pattern '{}': {}", pattern, e)))?;
        if !pattern.capture_names().flatten().any(|name| name == "period") {
            return Err(ReportError::Config(format!(
                "Period pattern '{}' has no 'period' capture group",
                pattern
            )));
        }
        Ok(Self { metric, pattern })
    }

    fn period_of(&self, header: &str) -> Option<String> {
        self.pattern
            .captures(header)
            .and_then(|caps| caps.name("period"))
            .map(|m| m.as_str().trim().to_string())
            .filter(|label| !label.is_empty())
    }
}

/// Compiled set of header matching rules
#[derive(Debug, Clone)]
pub struct SchemaRules {
    pub columns: Vec<ColumnRule>,
    pub periods: Vec<PeriodRule>,
}

/// Source headers feeding one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSources {
    pub label: String,
    pub sales: Vec<String>,
    pub profit: Vec<String>,
}

/// Result of matching one table's headers against [`SchemaRules`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Semantic field -> source header
    pub fields: BTreeMap<Field, String>,

    /// Periods in order of first appearance
    pub periods: Vec<PeriodSources>,

    /// Headers no rule claimed; carried through untouched
    pub passthrough: Vec<String>,
}

impl TableSchema {
    pub fn source_of(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

impl SchemaRules {
    /// Match headers (already trimmed) to semantic fields and periods.
    ///
    /// The first header matching a field wins; later duplicates fall through to
    /// passthrough. Several headers for the same period are summed downstream.
    pub fn match_headers<S: AsRef<str>>(&self, headers: &[S]) -> TableSchema {
        let mut schema = TableSchema::default();

        for header in headers {
            let header = header.as_ref();

            if let Some(rule) = self.columns.iter().find(|rule| rule.matches(header)) {
                if !schema.fields.contains_key(&rule.field) {
                    schema.fields.insert(rule.field, header.to_string());
                    continue;
                }
            }

            let period = self
                .periods
                .iter()
                .find_map(|rule| rule.period_of(header).map(|label| (rule.metric, label)));

            match period {
                Some((metric, label)) => {
                    let idx = match schema.periods.iter().position(|p| p.label == label) {
                        Some(idx) => idx,
                        None => {
                            schema.periods.push(PeriodSources {
                                label,
                                sales: Vec::new(),
                                profit: Vec::new(),
                            });
                            schema.periods.len() - 1
                        }
                    };
                    let sources = &mut schema.periods[idx];
                    match metric {
                        PeriodMetric::Sales => sources.sales.push(header.to_string()),
                        PeriodMetric::Profit => sources.profit.push(header.to_string()),
                    }
                }
                None => schema.passthrough.push(header.to_string()),
            }
        }

        tracing::debug!(
            fields = schema.fields.len(),
            periods = schema.periods.len(),
            passthrough = schema.passthrough.len(),
            "matched table headers"
        );

        schema
    }
}

/// Canonical layout of a normalized working table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Fields that came from a source column (as opposed to being injected)
    pub sourced: BTreeSet<Field>,

    /// Period labels in display order
    pub periods: Vec<String>,

    /// Untouched extra columns
    pub passthrough: Vec<String>,
}

impl TableLayout {
    pub fn has(&self, field: Field) -> bool {
        self.sourced.contains(&field)
    }

    pub fn has_period(&self, label: &str) -> bool {
        self.periods.iter().any(|p| p == label)
    }

    /// Canonical columns of the layout, identifier first
    pub fn canonical_columns(&self) -> Vec<String> {
        let mut columns = vec![IDENTIFIER.to_string(), NAME.to_string(), CATEGORY.to_string()];
        columns.extend(
            Field::ALL
                .iter()
                .filter(|f| f.is_numeric() && self.has(**f))
                .map(|f| f.column().to_string()),
        );
        for label in &self.periods {
            columns.push(period_sales_column(label));
            columns.push(period_profit_column(label));
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> SchemaRules {
        SchemaRules {
            columns: vec![
                ColumnRule {
                    field: Field::Identifier,
                    aliases: vec!["Item Code".to_string(), "Item Bar Code".to_string()],
                },
                ColumnRule {
                    field: Field::Category,
                    aliases: vec!["Category".to_string()],
                },
            ],
            periods: vec![
                PeriodRule::new(PeriodMetric::Sales, r"^(?P<period>.+?)\s+Total Sales$").unwrap(),
                PeriodRule::new(PeriodMetric::Profit, r"^(?P<period>.+?)\s+Total Profit$").unwrap(),
            ],
        }
    }

    #[test]
    fn test_match_fields_case_insensitive() {
        let schema = rules().match_headers(&["item code", "CATEGORY", "Notes"]);
        assert_eq!(schema.source_of(Field::Identifier), Some("item code"));
        assert_eq!(schema.source_of(Field::Category), Some("CATEGORY"));
        assert_eq!(schema.passthrough, vec!["Notes".to_string()]);
    }

    #[test]
    fn test_match_periods_in_header_order() {
        let schema = rules().match_headers(&[
            "Item Code",
            "Aug-2025 Total Sales",
            "Jul-2025 Total Sales",
            "Jul-2025 Total Profit",
            "Aug-2025 Total Profit",
        ]);
        let labels: Vec<&str> = schema.periods.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Aug-2025", "Jul-2025"]);
        assert_eq!(schema.periods[1].profit, vec!["Jul-2025 Total Profit".to_string()]);
    }

    #[test]
    fn test_bare_total_columns_are_not_periods() {
        let schema = rules().match_headers(&["Item Code", "Total Sales", "Total Profit"]);
        assert!(schema.periods.is_empty());
        assert_eq!(schema.passthrough.len(), 2);
    }

    #[test]
    fn test_second_identifier_alias_falls_through() {
        let schema = rules().match_headers(&["Item Bar Code", "Item Code"]);
        assert_eq!(schema.source_of(Field::Identifier), Some("Item Bar Code"));
        assert_eq!(schema.passthrough, vec!["Item Code".to_string()]);
    }

    #[test]
    fn test_pattern_without_period_group_rejected() {
        let result = PeriodRule::new(PeriodMetric::Sales, r"Total Sales$");
        assert!(matches!(result, Err(ReportError::Config(_))));
    }
}
