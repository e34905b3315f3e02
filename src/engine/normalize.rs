//! Column Normalizer
//!
//! Maps a raw spreadsheet frame onto the canonical working layout:
//! - resolves headers through [`SchemaRules`]
//! - coerces identifiers to strings
//! - casts numeric fields and period columns to Float64
//! - injects / fills defaults for absent or sparse fields

use crate::config::{EngineConfig, MissingPolicy};
use crate::engine::WorkingTable;
use crate::error::{ReportError, Result};
use crate::schema::{
    self, period_profit_column, period_sales_column, Field, SchemaRules, TableLayout,
    DERIVED_COLUMNS, IDENTIFIER,
};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Role of a source table, which decides the columns it cannot do without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// Per-item monthly sales/profit sheet
    Sales,
    /// Item price / stock list
    PriceList,
}

impl TableRole {
    pub fn label(self) -> &'static str {
        match self {
            TableRole::Sales => "sales",
            TableRole::PriceList => "price list",
        }
    }

    /// Fields that would fabricate identity if defaulted
    pub fn required_fields(self) -> &'static [Field] {
        match self {
            TableRole::Sales => &[Field::Identifier, Field::Category],
            TableRole::PriceList => &[Field::Identifier],
        }
    }
}

/// Column normalizer
pub struct Normalizer {
    rules: SchemaRules,
    unknown_label: String,
    policy: MissingPolicy,
}

impl Normalizer {
    pub fn new(rules: SchemaRules, unknown_label: impl Into<String>, policy: MissingPolicy) -> Self {
        Self {
            rules,
            unknown_label: unknown_label.into(),
            policy,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self::new(
            config.schema_rules()?,
            config.unknown_label.clone(),
            config.missing_policy,
        ))
    }

    pub fn policy(&self) -> MissingPolicy {
        self.policy
    }

    pub fn unknown_label(&self) -> &str {
        &self.unknown_label
    }

    /// Normalize a raw table into the canonical working layout.
    ///
    /// Rows whose identifier is empty are dropped; every other row survives.
    pub fn normalize(&self, raw: &DataFrame, role: TableRole) -> Result<WorkingTable> {
        let headers: Vec<String> = raw.get_column_names().iter().map(|s| s.to_string()).collect();
        let table_schema = self.rules.match_headers(&headers);

        for field in role.required_fields() {
            if table_schema.source_of(*field).is_none() {
                return Err(ReportError::MissingColumn {
                    table: role.label().to_string(),
                    field: field.to_string(),
                });
            }
        }

        // Step 1: project sourced fields and periods onto canonical names
        let mut exprs = Vec::new();
        for (field, source) in &table_schema.fields {
            let expr = match field {
                Field::Identifier => col(source),
                Field::Name | Field::Category => col(source).cast(DataType::String),
                _ => col(source).cast(DataType::Float64),
            };
            exprs.push(expr.alias(field.column()));
        }
        for period in &table_schema.periods {
            exprs.push(sum_of_sources(&period.sales).alias(&period_sales_column(&period.label)));
            exprs.push(sum_of_sources(&period.profit).alias(&period_profit_column(&period.label)));
        }

        let mut frame = raw.clone().lazy().with_columns(exprs).collect()?;

        // Step 2: identifiers are always strings
        let identifiers = coerce_identifiers(frame.column(IDENTIFIER)?)?;
        frame.with_column(identifiers)?;
        let frame = drop_blank_identifiers(frame, role)?;

        let layout = TableLayout {
            sourced: table_schema.fields.keys().copied().collect(),
            periods: table_schema.periods.iter().map(|p| p.label.clone()).collect(),
            passthrough: table_schema
                .passthrough
                .iter()
                .filter(|name| !is_reserved(name))
                .cloned()
                .collect(),
        };

        // Step 3: defaults, then canonical column order
        let frame = self.apply_defaults(frame, &layout)?;
        let mut columns = layout.canonical_columns();
        columns.extend(layout.passthrough.iter().cloned());
        let frame = frame.select(columns)?;

        debug!(
            role = role.label(),
            rows = frame.height(),
            periods = layout.periods.len(),
            "normalized table"
        );

        Ok(WorkingTable { frame, layout })
    }

    /// Fill the defaulting rules into a canonical frame.
    ///
    /// Name and category are injected with the unknown label when absent.
    /// Numeric fields and period columns are zero-filled under
    /// [`MissingPolicy::ZeroFill`] and left null otherwise.
    pub fn apply_defaults(&self, frame: DataFrame, layout: &TableLayout) -> Result<DataFrame> {
        let existing: HashSet<String> = frame.get_column_names().iter().map(|s| s.to_string()).collect();
        let mut exprs = Vec::new();

        for column in [schema::NAME, schema::CATEGORY] {
            let expr = if existing.contains(column) {
                col(column).fill_null(lit(self.unknown_label.as_str()))
            } else {
                lit(self.unknown_label.as_str())
            };
            exprs.push(expr.alias(column));
        }

        if self.policy == MissingPolicy::ZeroFill {
            let numeric = Field::ALL
                .iter()
                .filter(|f| f.is_numeric() && layout.has(**f))
                .map(|f| f.column().to_string());
            let periods = layout
                .periods
                .iter()
                .flat_map(|label| [period_sales_column(label), period_profit_column(label)]);

            for column in numeric.chain(periods) {
                if existing.contains(&column) {
                    exprs.push(col(&column).fill_null(lit(0.0)).alias(&column));
                }
            }
        }

        Ok(frame.lazy().with_columns(exprs).collect()?)
    }
}

/// Row-wise sum of the source columns of one period; sparse cells count as 0
fn sum_of_sources(sources: &[String]) -> Expr {
    sources
        .iter()
        .map(|source| col(source).cast(DataType::Float64).fill_null(lit(0.0)))
        .reduce(|acc, expr| acc + expr)
        .unwrap_or_else(|| lit(0.0))
}

fn is_reserved(name: &str) -> bool {
    Field::ALL.iter().any(|f| f.column() == name)
        || DERIVED_COLUMNS.contains(&name)
        || name.starts_with("sales[")
        || name.starts_with("profit[")
}

/// Render identifiers as trimmed strings.
///
/// Float-typed barcodes (spreadsheet numbers) drop a zero fraction so that
/// `1001.0` and `"1001"` key the same item.
pub fn coerce_identifiers(series: &Series) -> Result<Series> {
    let values: Vec<Option<String>> = match series.dtype() {
        DataType::Float32 | DataType::Float64 => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(format_numeric_identifier))
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
            .collect(),
    };

    Ok(Series::new(IDENTIFIER, values))
}

fn format_numeric_identifier(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn drop_blank_identifiers(frame: DataFrame, role: TableRole) -> Result<DataFrame> {
    let blanks = frame.column(IDENTIFIER)?.null_count();
    if blanks == 0 {
        return Ok(frame);
    }

    warn!(role = role.label(), rows = blanks, "dropping rows without an identifier");
    Ok(frame
        .lazy()
        .filter(col(IDENTIFIER).is_not_null())
        .collect()?)
}
