//! Portfolio Compositor
//!
//! Blends several leveraged legs into one portfolio price/return series:
//!
//! 1. Validate counts and weights (before any computation).
//! 2. Truncate every asset to the latest of the assets' first dates.
//! 3. Simulate each leg on its own calendar (weighted return and a
//!    weight-compounded price normalized to the leg's first price).
//! 4. Align all legs on the union of their dates; gaps become nulls.
//! 5. Sum legs per date, then drop every date where any leg is missing.
//!
//! The total price is the sum of independently compounded leg prices, not a
//! single compounding of the blended return. That is the contract downstream
//! peak detection sees and it is preserved as-is.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::common::{f64_values, i32_values};
use crate::error::{Result, StudyError};
use crate::leverage::{leg_label, simulate_weighted};
use crate::series::{date_to_ordinal, ordinal_to_date, PriceSeries};

/// Allowed slack when checking that weights sum to 1
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-asset column prefixes inside the merge frame
const LEG_FIELDS: [&str; 5] = [
    "adj_close",
    "daily_return",
    "leveraged_return",
    "weighted_return",
    "weighted_price",
];

/// Per-asset columns of the composed portfolio, aligned to its dates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetColumns {
    pub symbol: String,
    /// `<SYMBOL>_<L>X`
    pub label: String,
    pub leverage: f64,
    pub weight: f64,
    pub adj_close: Vec<f64>,
    pub daily_returns: Vec<f64>,
    pub leveraged_returns: Vec<f64>,
    pub weighted_returns: Vec<f64>,
    pub weighted_prices: Vec<f64>,
}

/// Weighted multi-asset portfolio; a single asset is the n = 1 case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSeries {
    pub dates: Vec<NaiveDate>,
    /// Σ weight × leveraged return
    pub total_returns: Vec<f64>,
    /// Σ weighted leveraged price
    pub total_prices: Vec<f64>,
    /// Σ weight × unleveraged adjusted close
    pub reference_prices: Vec<f64>,
    pub assets: Vec<AssetColumns>,
}

impl PortfolioSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Total portfolio price as a series for peak detection
    pub fn price_series(&self) -> PriceSeries {
        PriceSeries::from_validated("Portfolio", self.dates.clone(), self.total_prices.clone())
    }

    /// Unleveraged weighted reference for side-by-side comparison
    pub fn reference_series(&self) -> PriceSeries {
        PriceSeries::from_validated("Reference", self.dates.clone(), self.reference_prices.clone())
    }

    /// Wide table: Date, per-asset columns, totals
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let dates: Vec<String> = self.dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
        let mut columns = vec![Column::new("Date".into(), dates)];

        for asset in &self.assets {
            columns.push(Column::new(format!("AdjClose_{}", asset.symbol).into(), asset.adj_close.as_slice()));
            columns.push(Column::new(format!("DailyReturn_{}", asset.symbol).into(), asset.daily_returns.as_slice()));
            columns.push(Column::new(format!("LeveragedReturn_{}", asset.label).into(), asset.leveraged_returns.as_slice()));
            columns.push(Column::new(
                format!("WeightedLeveragedReturn_{}", asset.label).into(),
                asset.weighted_returns.as_slice(),
            ));
            columns.push(Column::new(
                format!("SimulatedLeveragedPrice_{}", asset.label).into(),
                asset.weighted_prices.as_slice(),
            ));
        }

        columns.push(Column::new("TotalPortfolioReturn".into(), self.total_returns.as_slice()));
        columns.push(Column::new("TotalPortfolioPrice".into(), self.total_prices.as_slice()));
        columns.push(Column::new("ReferencePrice".into(), self.reference_prices.as_slice()));

        DataFrame::new(columns)
    }
}

/// Check the allocation shape: one leverage and one weight per series,
/// weights finite in [0, 1] and summing to 1.
pub fn validate_allocation(series_count: usize, leverages: &[f64], weights: &[f64]) -> Result<()> {
    if series_count == 0 {
        return Err(StudyError::validation("portfolio needs at least one asset"));
    }
    if leverages.len() != series_count || weights.len() != series_count {
        return Err(StudyError::validation(format!(
            "the number of series ({}), leverage scalars ({}) and weights ({}) must match",
            series_count,
            leverages.len(),
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0 || **w > 1.0) {
        return Err(StudyError::validation(format!("weight {} outside [0, 1]", w)));
    }
    if let Some(l) = leverages.iter().find(|l| !l.is_finite()) {
        return Err(StudyError::invalid_input(format!("leverage {} is not a finite number", l)));
    }

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() >= WEIGHT_SUM_TOLERANCE {
        return Err(StudyError::validation(format!("portfolio weights must sum to 1, got {}", total)));
    }
    Ok(())
}

/// Compose a weighted portfolio of leveraged legs.
///
/// `series[i]` is simulated at `leverages[i]` and weighted by `weights[i]`.
pub fn compose(series: &[PriceSeries], leverages: &[f64], weights: &[f64]) -> Result<PortfolioSeries> {
    validate_allocation(series.len(), leverages, weights)?;

    let start = common_start(series)?;
    debug!(%start, assets = series.len(), "common start date");

    let legs = series
        .iter()
        .zip(leverages.iter().zip(weights))
        .map(|(s, (&leverage, &weight))| {
            let truncated = s.truncate_from(start);
            simulate_weighted(&truncated, leverage, weight).map(|leg| (truncated, leg))
        })
        .collect::<Result<Vec<_>>>()?;

    // Outer join on date: union of every leg's calendar
    let all_dates: BTreeSet<NaiveDate> = legs.iter().flat_map(|(_, leg)| leg.series.dates.iter().copied()).collect();
    let days: Vec<i32> = all_dates.iter().map(|d| date_to_ordinal(*d)).collect();

    let mut columns = vec![Column::new("day".into(), days.as_slice())];
    for (i, (truncated, leg)) in legs.iter().enumerate() {
        let row_of: BTreeMap<NaiveDate, usize> = leg.series.dates.iter().enumerate().map(|(r, d)| (*d, r)).collect();
        let align = |values: &[f64]| -> Vec<Option<f64>> {
            all_dates
                .iter()
                .map(|d| row_of.get(d).map(|&r| values[r]).filter(|v| !v.is_nan()))
                .collect()
        };

        // Raw adjusted close keeps its gaps so an unquoted date is dropped below
        columns.push(Column::new(format!("adj_close_{}", i).into(), align(truncated.prices())));
        columns.push(Column::new(format!("daily_return_{}", i).into(), align(&leg.series.daily_returns)));
        columns.push(Column::new(format!("leveraged_return_{}", i).into(), align(&leg.series.leveraged_returns)));
        columns.push(Column::new(format!("weighted_return_{}", i).into(), align(&leg.weighted_returns)));
        columns.push(Column::new(format!("weighted_price_{}", i).into(), align(&leg.weighted_prices)));
    }

    let merged = DataFrame::new(columns)?;
    let sum_of = |field: &str| -> Expr {
        (0..legs.len())
            .map(|i| col(format!("{}_{}", field, i)))
            .reduce(|acc, e| acc + e)
            .unwrap_or_else(|| lit(0.0))
    };
    let reference = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| col(format!("adj_close_{}", i)) * lit(w))
        .reduce(|acc, e| acc + e)
        .unwrap_or_else(|| lit(0.0));

    let complete_row = (0..legs.len())
        .flat_map(|i| LEG_FIELDS.iter().map(move |f| col(format!("{}_{}", f, i)).is_not_null()))
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));

    let union_dates = merged.height();
    let complete = merged
        .lazy()
        .with_columns([
            sum_of("weighted_return").alias("total_return"),
            sum_of("weighted_price").alias("total_price"),
            reference.alias("reference_price"),
        ])
        .filter(complete_row)
        .collect()?;

    info!(
        union_dates,
        complete_dates = complete.height(),
        assets = legs.len(),
        "composed portfolio"
    );
    if complete.height() == 0 {
        return Err(StudyError::invalid_input("no dates on which every asset reports a price"));
    }

    let dates = i32_values(&complete, "day")?
        .into_iter()
        .map(ordinal_to_date)
        .collect::<Result<Vec<_>>>()?;

    let assets = legs
        .iter()
        .enumerate()
        .map(|(i, (_, leg))| -> Result<AssetColumns> {
            Ok(AssetColumns {
                symbol: leg.series.symbol.clone(),
                label: leg_label(&leg.series.symbol, leg.series.leverage),
                leverage: leg.series.leverage,
                weight: leg.weight,
                adj_close: f64_values(&complete, &format!("adj_close_{}", i))?,
                daily_returns: f64_values(&complete, &format!("daily_return_{}", i))?,
                leveraged_returns: f64_values(&complete, &format!("leveraged_return_{}", i))?,
                weighted_returns: f64_values(&complete, &format!("weighted_return_{}", i))?,
                weighted_prices: f64_values(&complete, &format!("weighted_price_{}", i))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PortfolioSeries {
        dates,
        total_returns: f64_values(&complete, "total_return")?,
        total_prices: f64_values(&complete, "total_price")?,
        reference_prices: f64_values(&complete, "reference_price")?,
        assets,
    })
}

/// Latest first-available date across assets
fn common_start(series: &[PriceSeries]) -> Result<NaiveDate> {
    series
        .iter()
        .map(|s| {
            s.first_valid_date()
                .ok_or_else(|| StudyError::invalid_input(format!("{}: no prices", s.symbol)))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .max()
        .ok_or_else(|| StudyError::validation("portfolio needs at least one asset"))
}
