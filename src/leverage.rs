//! Leverage Simulator
//!
//! Turns an unleveraged daily price history into the price path of a
//! daily-rebalanced leveraged product:
//!
//! ```text
//! r[0] = 0,  r[i] = P[i] / P[i-1] - 1
//! L[i] = P[0] × Π_{k ≤ i} (1 + leverage × r[k])
//! ```
//!
//! Compounding is a `cum_prod` over the leveraged gross returns, evaluated as
//! one polars query. The Portfolio Compositor reuses the same query with a
//! weight folded in, so both paths share one numerical identity.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{count_missing, f64_values};
use crate::error::{Result, StudyError};
use crate::series::{PriceSeries, ReturnSeries};

/// A simulated leveraged price path and the returns that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeveragedSeries {
    pub symbol: String,
    pub leverage: f64,
    pub dates: Vec<NaiveDate>,
    /// Input prices after forward-filling gaps
    pub base_prices: Vec<f64>,
    pub daily_returns: Vec<f64>,
    pub leveraged_returns: Vec<f64>,
    pub leveraged_prices: Vec<f64>,
}

impl LeveragedSeries {
    pub fn len(&self) -> usize {
        self.leveraged_prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leveraged_prices.is_empty()
    }

    /// Leveraged prices as a standalone series, labelled `<SYMBOL>_<L>X`
    pub fn as_price_series(&self) -> PriceSeries {
        PriceSeries::from_validated(
            leg_label(&self.symbol, self.leverage),
            self.dates.clone(),
            self.leveraged_prices.clone(),
        )
    }

    pub fn leveraged_return_series(&self) -> ReturnSeries {
        ReturnSeries {
            dates: self.dates.clone(),
            returns: self.leveraged_returns.clone(),
        }
    }
}

/// One portfolio constituent: a leveraged series plus its weighted columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedLeg {
    pub series: LeveragedSeries,
    pub weight: f64,
    /// weight × leveraged return
    pub weighted_returns: Vec<f64>,
    /// P[0] × cumprod(1 + weighted return)
    pub weighted_prices: Vec<f64>,
}

/// Column label for a leveraged leg, e.g. `QQQ_3X`
pub fn leg_label(symbol: &str, leverage: f64) -> String {
    format!("{}_{}X", symbol, leverage)
}

/// Simulate a leveraged product from unleveraged prices.
///
/// Missing prices are forward-filled first. Fails with `InvalidInput` on an
/// empty series, a leading gap, a non-positive price, or a non-finite
/// leverage.
pub fn simulate(prices: &PriceSeries, leverage: f64) -> Result<LeveragedSeries> {
    simulate_weighted(prices, leverage, 1.0).map(|leg| leg.series)
}

/// [`simulate`] plus the weight-scaled return and price columns the
/// Portfolio Compositor sums.
pub fn simulate_weighted(prices: &PriceSeries, leverage: f64, weight: f64) -> Result<WeightedLeg> {
    if !leverage.is_finite() {
        return Err(StudyError::invalid_input(format!(
            "{}: leverage must be finite, got {}",
            prices.symbol, leverage
        )));
    }
    if !weight.is_finite() {
        return Err(StudyError::invalid_input(format!(
            "{}: weight must be finite, got {}",
            prices.symbol, weight
        )));
    }

    let gaps = count_missing(prices.prices());
    if gaps > 0 {
        warn!(symbol = %prices.symbol, gaps, "forward-filling missing prices");
    }
    let base = prices.forward_filled()?;

    let df = compound_frame(base.prices(), leverage, weight)?;
    debug!(symbol = %base.symbol, leverage, weight, rows = df.height(), "simulated leveraged series");

    let series = LeveragedSeries {
        symbol: base.symbol.clone(),
        leverage,
        dates: base.dates().to_vec(),
        base_prices: base.prices().to_vec(),
        daily_returns: f64_values(&df, "daily_return")?,
        leveraged_returns: f64_values(&df, "leveraged_return")?,
        leveraged_prices: f64_values(&df, "leveraged_price")?,
    };

    Ok(WeightedLeg {
        series,
        weight,
        weighted_returns: f64_values(&df, "weighted_return")?,
        weighted_prices: f64_values(&df, "weighted_price")?,
    })
}

/// Returns and compounded prices for one complete (gap-free) price column.
///
/// The shifted ratio leaves a null at row 0; filling it with 0 pins the first
/// return, so the first compounded factor is exactly 1 and the first price
/// equals the input's.
fn compound_frame(prices: &[f64], leverage: f64, weight: f64) -> PolarsResult<DataFrame> {
    let start = prices[0];

    df!("price" => prices)?
        .lazy()
        .with_column(
            (col("price") / col("price").shift(lit(1)) - lit(1.0))
                .fill_null(lit(0.0))
                .alias("daily_return"),
        )
        .with_column((col("daily_return") * lit(leverage)).alias("leveraged_return"))
        .with_column((col("leveraged_return") * lit(weight)).alias("weighted_return"))
        .with_columns([
            ((lit(1.0) + col("leveraged_return")).cum_prod(false) * lit(start)).alias("leveraged_price"),
            ((lit(1.0) + col("weighted_return")).cum_prod(false) * lit(start)).alias("weighted_price"),
        ])
        .collect()
}
