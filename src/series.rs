//! Price and return series
//!
//! A `PriceSeries` is an ordered run of (date, price) pairs with strictly
//! increasing dates. Missing prices are carried as `NaN`, the same convention
//! the parquet loader uses for null cells; transforms that need complete data
//! forward-fill first.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::common::{forward_fill, is_valid_price};
use crate::error::{Result, StudyError};

/// Day ordinal used as the join key inside polars frames
#[inline]
pub fn date_to_ordinal(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

/// Inverse of [`date_to_ordinal`]
#[inline]
pub fn ordinal_to_date(ordinal: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(ordinal)
        .ok_or_else(|| StudyError::invalid_input(format!("day ordinal {} out of range", ordinal)))
}

/// Ordered daily price history for one symbol (or a derived series)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub symbol: String,
    dates: Vec<NaiveDate>,
    prices: Vec<f64>,
}

impl PriceSeries {
    /// Build a series, checking lengths and strict date ordering
    pub fn new(symbol: impl Into<String>, dates: Vec<NaiveDate>, prices: Vec<f64>) -> Result<Self> {
        let symbol = symbol.into();
        if dates.len() != prices.len() {
            return Err(StudyError::invalid_input(format!(
                "{}: {} dates but {} prices",
                symbol,
                dates.len(),
                prices.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(StudyError::invalid_input(format!(
                "{}: dates not strictly increasing at {} -> {}",
                symbol, w[0], w[1]
            )));
        }
        Ok(Self { symbol, dates, prices })
    }

    /// Build from parts already known to be ordered (derived series)
    pub(crate) fn from_validated(symbol: impl Into<String>, dates: Vec<NaiveDate>, prices: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), prices.len());
        Self {
            symbol: symbol.into(),
            dates,
            prices,
        }
    }

    /// Convenience for synthetic data: consecutive calendar days from `start`
    pub fn from_daily(symbol: impl Into<String>, start: NaiveDate, prices: Vec<f64>) -> Self {
        let dates = start.iter_days().take(prices.len()).collect();
        Self {
            symbol: symbol.into(),
            dates,
            prices,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// First date carrying an actual price
    pub fn first_valid_date(&self) -> Option<NaiveDate> {
        self.prices
            .iter()
            .position(|p| !p.is_nan())
            .map(|i| self.dates[i])
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Copy of the series with gaps forward-filled.
    ///
    /// Fails when the first price is missing or any filled price is not a
    /// positive finite number.
    pub fn forward_filled(&self) -> Result<Self> {
        if self.is_empty() {
            return Err(StudyError::invalid_input(format!("{}: empty price series", self.symbol)));
        }

        let filled = forward_fill(&self.prices);
        if let Some(pos) = filled.iter().position(|&p| !is_valid_price(p)) {
            return Err(StudyError::invalid_input(format!(
                "{}: unusable price {} at {}",
                self.symbol, self.prices[pos], self.dates[pos]
            )));
        }

        Ok(Self {
            symbol: self.symbol.clone(),
            dates: self.dates.clone(),
            prices: filled,
        })
    }

    /// Rows on or after `start`
    pub fn truncate_from(&self, start: NaiveDate) -> Self {
        let from = self.dates.partition_point(|d| *d < start);
        Self {
            symbol: self.symbol.clone(),
            dates: self.dates[from..].to_vec(),
            prices: self.prices[from..].to_vec(),
        }
    }

    /// Simple daily returns; index 0 is defined as 0
    pub fn returns(&self) -> ReturnSeries {
        let mut returns = Vec::with_capacity(self.len());
        if !self.is_empty() {
            returns.push(0.0);
        }
        returns.extend(self.prices.windows(2).map(|w| w[1] / w[0] - 1.0));

        ReturnSeries {
            dates: self.dates.clone(),
            returns,
        }
    }
}

/// Daily returns aligned 1:1 with a price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}
