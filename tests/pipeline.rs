//! End-to-end runs of the study pipeline over in-memory data

use std::cell::Cell;

use approx::assert_relative_eq;
use chrono::NaiveDate;

use leveraged_highs::*;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap()
}

/// Drifting series with a slow oscillation, so it sets highs and drawdowns
fn synthetic(symbol: &str, from: NaiveDate, n: usize, drift: f64) -> PriceSeries {
    let prices = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 * (1.0 + drift).powf(t) * (1.0 + 0.08 * (t / 40.0).sin())
        })
        .collect();
    PriceSeries::from_daily(symbol, from, prices)
}

/// Wraps a source and counts fetches
struct CountingSource {
    inner: InMemorySource,
    calls: Cell<usize>,
}

impl PriceSource for CountingSource {
    fn daily_bars(&self, symbol: &str) -> Result<Vec<DailyBar>> {
        self.calls.set(self.calls.get() + 1);
        self.inner.daily_bars(symbol)
    }
}

fn short_config(tickers: &[&str], leverages: Vec<f64>, weights: Vec<f64>) -> StudyConfig {
    let mut config = StudyConfig::new(tickers.iter().map(|t| t.to_string()).collect(), leverages, weights);
    config.holding_periods = HoldingPeriods::new([("1M", 30), ("3M", 91)]).unwrap();
    config
}

#[test]
fn single_asset_study_matches_simulator() {
    let qqq = synthetic("QQQ", start(), 400, 0.0005);
    let source = InMemorySource::new().with_series(&qqq);
    let config = short_config(&["QQQ"], vec![3.0], vec![1.0]);

    let report = run_study(&source, &config).unwrap();
    let lev = simulate(&qqq, 3.0).unwrap();

    assert_eq!(report.portfolio.len(), qqq.len());
    for (a, b) in report.portfolio.total_prices.iter().zip(&lev.leveraged_prices) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
    for (a, b) in report.portfolio.reference_prices.iter().zip(qqq.prices()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
}

#[test]
fn groups_follow_window_order_with_one_baseline() {
    let qqq = synthetic("QQQ", start(), 600, 0.0004);
    let tlt = synthetic("TLT", start(), 600, 0.0001);
    let source = InMemorySource::new().with_series(&qqq).with_series(&tlt);

    let mut config = short_config(&["QQQ", "TLT"], vec![3.0, 3.0], vec![0.6, 0.4]);
    config.mode = "rolling_window_max".into();
    config.windows = vec![0, 5, 20];

    let report = run_study(&source, &config).unwrap();
    assert_eq!(
        report.table.groups(),
        vec![
            "rolling_window_max (Window=0)",
            "Non-rolling_window_max (Window=0)",
            "rolling_window_max (Window=5)",
            "rolling_window_max (Window=20)",
        ]
    );

    // Peak and baseline at the smallest radius partition the series
    let n = report.portfolio.len();
    let per_position = config.holding_periods.len();
    let at_zero = report
        .table
        .rows
        .iter()
        .filter(|r| r.group.ends_with("(Window=0)"))
        .count();
    assert_eq!(at_zero, n * per_position);

    // Wider radii never shrink the peak set
    let peaks = |label: &str| report.table.for_group(label).count();
    assert!(peaks("rolling_window_max (Window=5)") >= peaks("rolling_window_max (Window=0)"));
    assert!(peaks("rolling_window_max (Window=20)") >= peaks("rolling_window_max (Window=5)"));
}

#[test]
fn later_listing_sets_the_common_start() {
    let old = synthetic("OLD", start(), 300, 0.0003);
    let young_start = start() + chrono::Duration::days(100);
    let young = synthetic("NEW", young_start, 200, 0.0006);
    let source = InMemorySource::new().with_series(&old).with_series(&young);

    let config = short_config(&["OLD", "NEW"], vec![2.0, 3.0], vec![0.5, 0.5]);
    let report = run_study(&source, &config).unwrap();

    assert_eq!(report.portfolio.dates[0], young_start);
    assert_eq!(report.portfolio.len(), 200);

    // Each leg restarts its compounding at the common start
    let first_total = report.portfolio.total_prices[0];
    assert_relative_eq!(first_total, old.prices()[100] + young.prices()[0], max_relative = 1e-12);
}

#[test]
fn missing_symbol_fails_with_data_unavailable() {
    let qqq = synthetic("QQQ", start(), 50, 0.001);
    let source = InMemorySource::new().with_series(&qqq);
    let config = short_config(&["QQQ", "NOPE"], vec![3.0, 1.0], vec![0.5, 0.5]);

    match run_study(&source, &config) {
        Err(StudyError::DataUnavailable { symbol, .. }) => assert_eq!(symbol, "NOPE"),
        other => panic!("expected DataUnavailable, got {:?}", other.map(|r| r.table.len())),
    }
}

#[test]
fn validation_happens_before_any_fetch() {
    let source = CountingSource {
        inner: InMemorySource::new().with_series(&synthetic("QQQ", start(), 50, 0.001)),
        calls: Cell::new(0),
    };

    let bad_weights = short_config(&["QQQ", "QQQ"], vec![3.0, 1.0], vec![0.5, 0.6]);
    assert!(run_study(&source, &bad_weights).unwrap_err().is_validation());

    let mut bad_mode = short_config(&["QQQ"], vec![3.0], vec![1.0]);
    bad_mode.mode = "new_high".into();
    assert!(run_study(&source, &bad_mode).unwrap_err().is_validation());

    let mut no_windows = short_config(&["QQQ"], vec![3.0], vec![1.0]);
    no_windows.windows.clear();
    assert!(run_study(&source, &no_windows).unwrap_err().is_validation());

    assert_eq!(source.calls.get(), 0);
}

#[test]
fn repeated_ticker_is_fetched_once() {
    let source = CountingSource {
        inner: InMemorySource::new().with_series(&synthetic("QQQ", start(), 120, 0.001)),
        calls: Cell::new(0),
    };
    let config = short_config(&["QQQ", "QQQ"], vec![1.0, 3.0], vec![0.5, 0.5]);

    let report = run_study(&source, &config).unwrap();
    assert_eq!(source.calls.get(), 1);
    assert_eq!(report.portfolio.assets.len(), 2);
    assert_eq!(report.portfolio.assets[0].label, "QQQ_1X");
    assert_eq!(report.portfolio.assets[1].label, "QQQ_3X");
}

#[test]
fn tail_positions_report_unavailable_returns() {
    let qqq = synthetic("QQQ", start(), 100, 0.001);
    let source = InMemorySource::new().with_series(&qqq);
    let config = short_config(&["QQQ"], vec![2.0], vec![1.0]);

    let report = run_study(&source, &config).unwrap();
    let three_month: Vec<&LabeledReturn> = report
        .table
        .rows
        .iter()
        .filter(|r| r.holding_period == "3M")
        .collect();

    assert!(three_month.iter().filter(|r| r.index + 91 >= 100).all(|r| r.value.is_none()));
    assert!(three_month.iter().filter(|r| r.index + 91 < 100).all(|r| r.value.is_some()));

    let summary = report.table.summarize();
    let total_unavailable: usize = summary.iter().filter(|s| s.holding_period == "3M").map(|s| s.unavailable).sum();
    assert_eq!(total_unavailable, 91);
}

#[test]
fn portfolio_frame_has_named_columns() {
    let qqq = synthetic("QQQ", start(), 30, 0.001);
    let tlt = synthetic("TLT", start(), 30, 0.0002);
    let portfolio = compose(&[qqq, tlt], &[3.0, 2.0], &[0.7, 0.3]).unwrap();
    let df = portfolio.to_dataframe().unwrap();

    assert_eq!(df.height(), 30);
    for name in [
        "Date",
        "AdjClose_QQQ",
        "LeveragedReturn_QQQ_3X",
        "SimulatedLeveragedPrice_TLT_2X",
        "TotalPortfolioReturn",
        "TotalPortfolioPrice",
        "ReferencePrice",
    ] {
        assert!(df.column(name).is_ok(), "missing column {}", name);
    }
}
