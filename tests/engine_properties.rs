use gp_insights::config::{EngineConfig, MissingPolicy, RatioFallback};
use gp_insights::engine::{
    apply_predicates, join_tables, Aggregator, GpBucket, JoinMode, MetricDeriver, Normalizer,
    Predicate, TableRole, TextField, WorkingTable,
};
use gp_insights::schema::{
    CATEGORY, GROSS_PROFIT_RATIO, IDENTIFIER, NAME, STOCK_QUANTITY, TOTAL_PROFIT, TOTAL_SALES,
};
use itertools::Itertools;
use polars::prelude::*;

fn normalizer(policy: MissingPolicy) -> Normalizer {
    Normalizer::from_config(&EngineConfig {
        missing_policy: policy,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn sales_sheet() -> DataFrame {
    df! [
        "Item Code" => ["A", "B", "C", "D", "E"],
        "Item Name" => ["Cola", "Crisps", "Juice", "Nuts", "Water"],
        "Category" => ["Drinks", "Snacks", "Drinks", "Snacks", "Drinks"],
        "Jul-2025 Total Sales" => [100.0, 50.0, 200.0, 0.0, 80.0],
        "Jul-2025 Total Profit" => [20.0, 5.0, 6.0, 0.0, 40.0],
        "Aug-2025 Total Sales" => [100.0, 50.0, 0.0, 0.0, 20.0],
        "Aug-2025 Total Profit" => [20.0, 5.0, 0.0, 0.0, 10.0]
    ]
    .unwrap()
}

fn derived_sales() -> WorkingTable {
    let table = normalizer(MissingPolicy::ZeroFill)
        .normalize(&sales_sheet(), TableRole::Sales)
        .unwrap();
    MetricDeriver::default().derive(&table).unwrap()
}

fn identifiers(df: &DataFrame) -> Vec<String> {
    df.column(IDENTIFIER)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
}

fn ratio_of(df: &DataFrame, id: &str) -> Option<f64> {
    let ids = identifiers(df);
    let idx = ids.iter().position(|i| i == id)?;
    df.column(GROSS_PROFIT_RATIO).unwrap().f64().unwrap().get(idx)
}

#[test]
fn test_two_item_drinks_and_snacks_scenario() {
    let raw = df! [
        "Item Code" => ["A", "B"],
        "Category" => ["Drinks", "Snacks"],
        "Jul-2025 Total Sales" => [100.0, 0.0],
        "Jul-2025 Total Profit" => [20.0, 0.0]
    ]
    .unwrap();

    let table = normalizer(MissingPolicy::ZeroFill)
        .normalize(&raw, TableRole::Sales)
        .unwrap();
    let derived = MetricDeriver::default().derive(&table).unwrap();

    assert_eq!(ratio_of(&derived.frame, "A"), Some(0.2));
    assert_eq!(ratio_of(&derived.frame, "B"), Some(0.0));

    let aggregator = Aggregator::default();
    let groups = aggregator.by_category(&derived).unwrap();
    let drinks = groups.iter().find(|g| g.key == "Drinks").unwrap();
    let snacks = groups.iter().find(|g| g.key == "Snacks").unwrap();
    assert_eq!(drinks.gross_profit_ratio, Some(0.2));
    assert_eq!(snacks.gross_profit_ratio, Some(0.0));

    let total = aggregator.grand_total(&groups);
    assert_eq!(total.total_sales, 100.0);
    assert_eq!(total.total_profit, 20.0);
    assert_eq!(total.gross_profit_ratio, Some(0.2));
}

#[test]
fn test_deriving_twice_changes_nothing() {
    let once = derived_sales();
    let twice = MetricDeriver::default().derive(&once).unwrap();
    assert!(once.frame.equals_missing(&twice.frame));
}

#[test]
fn test_zero_sales_never_divides() {
    for fallback in [RatioFallback::Zero, RatioFallback::Missing] {
        let table = normalizer(MissingPolicy::ZeroFill)
            .normalize(&sales_sheet(), TableRole::Sales)
            .unwrap();
        let derived = MetricDeriver::new(fallback).derive(&table).unwrap();

        let ratio = ratio_of(&derived.frame, "D");
        assert_eq!(ratio, fallback.value());

        let ratios = derived.frame.column(GROSS_PROFIT_RATIO).unwrap().f64().unwrap().clone();
        assert!(ratios.into_iter().flatten().all(f64::is_finite));
    }
}

#[test]
fn test_predicate_order_does_not_matter() {
    let derived = derived_sales();
    let predicates = vec![
        Predicate::CategoryIn(vec!["Drinks".to_string(), "Snacks".to_string()]),
        Predicate::CategoryNotIn(vec!["Snacks".to_string()]),
        Predicate::GpBuckets(vec![GpBucket::From20To30, GpBucket::From30]),
        Predicate::TextContains {
            field: TextField::Name,
            needle: "a".to_string(),
        },
    ];

    let expected = identifiers(&apply_predicates(&derived.frame, &predicates).unwrap());
    assert_eq!(expected, vec!["A", "E"]);

    for order in predicates.iter().cloned().permutations(predicates.len()) {
        let out = apply_predicates(&derived.frame, &order).unwrap();
        assert_eq!(identifiers(&out), expected);
    }
}

#[test]
fn test_bucket_five_to_ten_scenario() {
    let frame = df! [
        IDENTIFIER => ["X", "Y", "Z"],
        GROSS_PROFIT_RATIO => [0.03, 0.07, 0.12]
    ]
    .unwrap();

    let out = apply_predicates(&frame, &[Predicate::GpBuckets(vec![GpBucket::From5To10])]).unwrap();
    assert_eq!(identifiers(&out), vec!["Y"]);
}

#[test]
fn test_group_sums_match_item_sums() {
    let derived = derived_sales();
    let aggregator = Aggregator::default();
    let groups = aggregator.by_category(&derived).unwrap();

    for group in &groups {
        let members = apply_predicates(
            &derived.frame,
            &[Predicate::CategoryIn(vec![group.key.clone()])],
        )
        .unwrap();
        let sales: f64 = members.column(TOTAL_SALES).unwrap().f64().unwrap().into_iter().flatten().sum();
        let profit: f64 = members.column(TOTAL_PROFIT).unwrap().f64().unwrap().into_iter().flatten().sum();

        assert!((group.total_sales - sales).abs() < 1e-9);
        assert!((group.total_profit - profit).abs() < 1e-9);
        assert_eq!(group.item_count, members.height());
        assert_eq!(group.gross_profit_ratio, Some(profit / sales));
    }

    let total = aggregator.grand_total(&groups);
    assert_eq!(total.total_sales, 600.0);
    assert_eq!(total.total_profit, 106.0);
    assert_eq!(total.item_count, 5);
}

#[test]
fn test_filter_to_nothing_is_empty_summary() {
    let derived = derived_sales();
    let empty = derived.with_frame(
        apply_predicates(&derived.frame, &[Predicate::CategoryIn(vec!["Frozen".to_string()])]).unwrap(),
    );
    assert!(empty.is_empty());

    let aggregator = Aggregator::default();
    assert!(aggregator.by_category(&empty).unwrap().is_empty());
    let buckets = aggregator.bucket_distribution(&empty).unwrap();
    assert!(buckets.iter().all(|b| b.item_count == 0));
}

fn price_list() -> DataFrame {
    df! [
        "Item Bar Code" => ["X", "A"],
        "Item Name" => ["Ghost Item", "Cola"],
        "Category" => ["Misc", "Drinks"],
        "Stock" => [4.0, 10.0],
        "Selling" => [2.5, 1.2],
        "Cost" => [2.0, 1.0]
    ]
    .unwrap()
}

fn empty_sales() -> DataFrame {
    df! [
        "Item Code" => Vec::<&str>::new(),
        "Category" => Vec::<&str>::new(),
        "Jul-2025 Total Sales" => Vec::<f64>::new(),
        "Jul-2025 Total Profit" => Vec::<f64>::new()
    ]
    .unwrap()
}

#[test]
fn test_left_join_against_empty_sales_zero_fills() {
    let n = normalizer(MissingPolicy::ZeroFill);
    let prices = n.normalize(&price_list(), TableRole::PriceList).unwrap();
    let sales = n.normalize(&empty_sales(), TableRole::Sales).unwrap();

    let joined = join_tables(&prices, &sales, JoinMode::LeftPreserving, &n).unwrap();
    let derived = MetricDeriver::default().derive(&joined).unwrap();

    assert_eq!(identifiers(&derived.frame), vec!["X", "A"]);
    let sales_col = derived.frame.column(TOTAL_SALES).unwrap().f64().unwrap().clone();
    assert_eq!(sales_col.get(0), Some(0.0));
    assert_eq!(ratio_of(&derived.frame, "X"), Some(0.0));
    let names = derived.frame.column(NAME).unwrap().str().unwrap().clone();
    assert_eq!(names.get(0), Some("Ghost Item"));
}

#[test]
fn test_left_join_against_empty_sales_keeps_missing() {
    let n = normalizer(MissingPolicy::ExplicitMissing);
    let prices = n.normalize(&price_list(), TableRole::PriceList).unwrap();
    let sales = n.normalize(&empty_sales(), TableRole::Sales).unwrap();

    let joined = join_tables(&prices, &sales, JoinMode::LeftPreserving, &n).unwrap();
    let derived = MetricDeriver::new(RatioFallback::Missing).derive(&joined).unwrap();

    let sales_col = derived.frame.column(TOTAL_SALES).unwrap();
    assert_eq!(sales_col.null_count(), 2);
    assert_eq!(ratio_of(&derived.frame, "X"), None);
    // stock came from the price list and stays populated
    assert_eq!(derived.frame.column(STOCK_QUANTITY).unwrap().null_count(), 0);
}

#[test]
fn test_missing_totals_still_take_zero_ratio_fallback() {
    let n = normalizer(MissingPolicy::ExplicitMissing);
    let prices = n.normalize(&price_list(), TableRole::PriceList).unwrap();
    let sales = n
        .normalize(
            &df! [
                "Item Code" => ["A"],
                "Category" => ["Drinks"],
                "Jul-2025 Total Sales" => [100.0],
                "Jul-2025 Total Profit" => [20.0]
            ]
            .unwrap(),
            TableRole::Sales,
        )
        .unwrap();

    let joined = join_tables(&prices, &sales, JoinMode::LeftPreserving, &n).unwrap();
    let derived = MetricDeriver::new(RatioFallback::Zero).derive(&joined).unwrap();

    assert_eq!(ratio_of(&derived.frame, "A"), Some(0.2));
    assert_eq!(ratio_of(&derived.frame, "X"), Some(0.0));
    assert_eq!(derived.frame.column(TOTAL_SALES).unwrap().null_count(), 1);

    let buckets = Aggregator::default().bucket_distribution(&derived).unwrap();
    let counted: usize = buckets.iter().map(|b| b.item_count).sum();
    assert_eq!(counted, 2);
}

#[test]
fn test_full_outer_join_keeps_every_identifier_once() {
    let n = normalizer(MissingPolicy::ZeroFill);
    let prices = n.normalize(&price_list(), TableRole::PriceList).unwrap();
    let sales = n.normalize(&sales_sheet(), TableRole::Sales).unwrap();

    let joined = join_tables(&prices, &sales, JoinMode::FullOuter, &n).unwrap();
    let ids = identifiers(&joined.frame);

    let mut expected: Vec<String> = identifiers(&prices.frame)
        .into_iter()
        .chain(identifiers(&sales.frame))
        .unique()
        .collect();
    let mut actual = ids.clone();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);
    assert_eq!(ids.len(), ids.iter().unique().count());

    let categories = joined.frame.column(CATEGORY).unwrap();
    assert_eq!(categories.null_count(), 0);
}

#[test]
fn test_right_join_keeps_sales_rows_only() {
    let n = normalizer(MissingPolicy::ZeroFill);
    let prices = n.normalize(&price_list(), TableRole::PriceList).unwrap();
    let sales = n.normalize(&sales_sheet(), TableRole::Sales).unwrap();

    let joined = join_tables(&prices, &sales, JoinMode::RightPreserving, &n).unwrap();
    let mut ids = identifiers(&joined.frame);
    ids.sort();
    assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);

    let stock = joined.frame.column(STOCK_QUANTITY).unwrap().f64().unwrap().clone();
    let position = identifiers(&joined.frame).iter().position(|i| i == "B").unwrap();
    assert_eq!(stock.get(position), Some(0.0));
}
