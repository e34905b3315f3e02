//! Table Joiner
//!
//! Combines two normalized tables on their string identifier. The join mode
//! is always explicit. Overlapping columns are coalesced with the left table's
//! value taking priority; cells no side could fill go through the normalizer's
//! defaulting rules, so the caller's [`MissingPolicy`] decides between 0 and
//! an explicit null.
//!
//! [`MissingPolicy`]: crate::config::MissingPolicy

use crate::engine::{Normalizer, WorkingTable};
use crate::error::{ReportError, Result};
use crate::schema::{period_profit_column, period_sales_column, Field, TableLayout, IDENTIFIER};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

const RIGHT_SUFFIX: &str = "__right";

/// Which rows survive a join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Every left row, right attached where matched
    #[default]
    LeftPreserving,
    /// Every right row, left attached where matched
    RightPreserving,
    /// Every identifier from either side, once
    FullOuter,
}

impl FromStr for JoinMode {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" | "left_preserving" => Ok(JoinMode::LeftPreserving),
            "right" | "right_preserving" => Ok(JoinMode::RightPreserving),
            "outer" | "full" | "full_outer" => Ok(JoinMode::FullOuter),
            other => Err(ReportError::InvalidParameter(format!("Unknown join mode: {}", other))),
        }
    }
}

/// Canonical columns a table actually sourced (injected defaults excluded)
fn sourced_columns(layout: &TableLayout) -> Vec<String> {
    let mut columns: Vec<String> = layout
        .sourced
        .iter()
        .filter(|f| **f != Field::Identifier)
        .map(|f| f.column().to_string())
        .collect();
    for label in &layout.periods {
        columns.push(period_sales_column(label));
        columns.push(period_profit_column(label));
    }
    columns
}

fn warn_on_duplicate_keys(table: &WorkingTable, side: &str) -> Result<()> {
    let unique = table.frame.column(IDENTIFIER)?.n_unique()?;
    if unique < table.height() {
        warn!(
            side,
            duplicates = table.height() - unique,
            "join key has duplicate identifiers; matches will fan out"
        );
    }
    Ok(())
}

/// Ordered union of both sides' identifiers, left first
fn key_frame(left: &WorkingTable, right: &WorkingTable) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mut keys: Vec<String> = Vec::new();

    for table in [left, right] {
        for key in table.frame.column(IDENTIFIER)?.str()?.into_iter().flatten() {
            if seen.insert(key.to_string()) {
                keys.push(key.to_string());
            }
        }
    }

    Ok(DataFrame::new(vec![Series::new(IDENTIFIER, keys)])?)
}

/// Join `left` and `right` on `identifier` according to `mode`
pub fn join_tables(
    left: &WorkingTable,
    right: &WorkingTable,
    mode: JoinMode,
    normalizer: &Normalizer,
) -> Result<WorkingTable> {
    warn_on_duplicate_keys(left, "left")?;
    warn_on_duplicate_keys(right, "right")?;

    let left_columns = sourced_columns(&left.layout);
    let right_columns = sourced_columns(&right.layout);
    let overlap: Vec<String> = right_columns
        .iter()
        .filter(|c| left_columns.contains(c))
        .cloned()
        .collect();

    // Project both sides; overlapping right columns get a suffix
    let mut left_select = vec![col(IDENTIFIER)];
    left_select.extend(left_columns.iter().map(|c| col(c)));
    let left_lf = left.frame.clone().lazy().select(left_select);

    let mut right_select = vec![col(IDENTIFIER)];
    right_select.extend(right_columns.iter().map(|c| {
        if overlap.contains(c) {
            col(c).alias(&format!("{}{}", c, RIGHT_SUFFIX))
        } else {
            col(c)
        }
    }));
    let right_lf = right.frame.clone().lazy().select(right_select);

    let on = [col(IDENTIFIER)];
    let joined = match mode {
        JoinMode::LeftPreserving => {
            left_lf.join(right_lf, on.clone(), on, JoinArgs::new(JoinType::Left))
        }
        JoinMode::RightPreserving => {
            right_lf.join(left_lf, on.clone(), on, JoinArgs::new(JoinType::Left))
        }
        JoinMode::FullOuter => key_frame(left, right)?
            .lazy()
            .join(left_lf, on.clone(), on.clone(), JoinArgs::new(JoinType::Left))
            .join(right_lf, on.clone(), on, JoinArgs::new(JoinType::Left)),
    };

    // Coalesce overlaps, left value first
    let coalesced: Vec<Expr> = overlap
        .iter()
        .map(|c| {
            let right_col = format!("{}{}", c, RIGHT_SUFFIX);
            when(col(c).is_null())
                .then(col(&right_col))
                .otherwise(col(c))
                .alias(c)
        })
        .collect();

    let mut periods = left.layout.periods.clone();
    periods.extend(
        right
            .layout
            .periods
            .iter()
            .filter(|p| !left.layout.has_period(p))
            .cloned(),
    );
    let layout = TableLayout {
        sourced: left.layout.sourced.union(&right.layout.sourced).copied().collect(),
        periods,
        passthrough: Vec::new(),
    };

    let mut keep = vec![col(IDENTIFIER)];
    keep.extend(sourced_columns(&layout).iter().map(|c| col(c)));
    let frame = joined.with_columns(coalesced).select(keep).collect()?;

    debug!(
        ?mode,
        left_rows = left.height(),
        right_rows = right.height(),
        rows = frame.height(),
        "joined tables"
    );

    let frame = normalizer.apply_defaults(frame, &layout)?;
    let frame = frame.select(layout.canonical_columns())?;

    Ok(WorkingTable { frame, layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, MissingPolicy};
    use crate::engine::TableRole;
    use crate::schema::{CATEGORY, NAME, STOCK_QUANTITY};

    fn normalizer(policy: MissingPolicy) -> Normalizer {
        Normalizer::from_config(&EngineConfig {
            missing_policy: policy,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn tables(normalizer: &Normalizer) -> (WorkingTable, WorkingTable) {
        let prices = df!(
            "Item Bar Code" => &["1001", "1002"],
            "Item Name" => &["Cola", "Chips"],
            "Stock" => &[5.0, 0.0]
        )
        .unwrap();
        let sales = df!(
            "Item Code" => &[1002i64, 1003],
            "Category" => &["Snacks", "Drinks"],
            "Jul-2025 Total Sales" => &[40.0, 10.0],
            "Jul-2025 Total Profit" => &[8.0, 1.0]
        )
        .unwrap();
        (
            normalizer.normalize(&prices, TableRole::PriceList).unwrap(),
            normalizer.normalize(&sales, TableRole::Sales).unwrap(),
        )
    }

    fn ids(table: &WorkingTable) -> Vec<String> {
        table
            .frame
            .column(IDENTIFIER)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_left_preserving_zero_fills_unmatched() {
        let n = normalizer(MissingPolicy::ZeroFill);
        let (prices, sales) = tables(&n);
        let joined = join_tables(&prices, &sales, JoinMode::LeftPreserving, &n).unwrap();

        assert_eq!(ids(&joined), vec!["1001", "1002"]);
        let jul = joined.f64_values(&period_sales_column("Jul-2025")).unwrap();
        assert_eq!(jul, vec![Some(0.0), Some(40.0)]);

        let categories = crate::engine::str_values(&joined.frame, CATEGORY).unwrap();
        assert_eq!(categories, vec![Some("Unknown".to_string()), Some("Snacks".to_string())]);
    }

    #[test]
    fn test_right_preserving_keeps_sales_rows() {
        let n = normalizer(MissingPolicy::ZeroFill);
        let (prices, sales) = tables(&n);
        let joined = join_tables(&prices, &sales, JoinMode::RightPreserving, &n).unwrap();

        assert_eq!(ids(&joined), vec!["1002", "1003"]);
        let names = crate::engine::str_values(&joined.frame, NAME).unwrap();
        assert_eq!(names, vec![Some("Chips".to_string()), Some("Unknown".to_string())]);
    }

    #[test]
    fn test_full_outer_explicit_missing() {
        let n = normalizer(MissingPolicy::ExplicitMissing);
        let (prices, sales) = tables(&n);
        let joined = join_tables(&prices, &sales, JoinMode::FullOuter, &n).unwrap();

        assert_eq!(ids(&joined), vec!["1001", "1002", "1003"]);
        let stock = joined.f64_values(STOCK_QUANTITY).unwrap();
        assert_eq!(stock, vec![Some(5.0), Some(0.0), None]);
        let jul = joined.f64_values(&period_sales_column("Jul-2025")).unwrap();
        assert_eq!(jul, vec![None, Some(40.0), Some(10.0)]);
    }

    #[test]
    fn test_overlapping_columns_prefer_left() {
        let n = normalizer(MissingPolicy::ZeroFill);
        let left = n
            .normalize(
                &df!("Item Code" => &["A", "B"], "Category" => &[Some("Drinks"), None]).unwrap(),
                TableRole::Sales,
            )
            .unwrap();
        let right = n
            .normalize(
                &df!("Item Code" => &["A", "B"], "Category" => &["Soda", "Snacks"]).unwrap(),
                TableRole::Sales,
            )
            .unwrap();

        let joined = join_tables(&left, &right, JoinMode::LeftPreserving, &n).unwrap();
        let categories = crate::engine::str_values(&joined.frame, CATEGORY).unwrap();
        // left "B" was already defaulted to Unknown by its own normalization
        assert_eq!(categories, vec![Some("Drinks".to_string()), Some("Unknown".to_string())]);
    }

    #[test]
    fn test_join_mode_parsing() {
        assert_eq!("outer".parse::<JoinMode>().unwrap(), JoinMode::FullOuter);
        assert_eq!("Right".parse::<JoinMode>().unwrap(), JoinMode::RightPreserving);
        assert!("cross".parse::<JoinMode>().is_err());
    }
}
