//! Forward-Return Calculator
//!
//! For each anchor position `i` and holding period `h`:
//!
//! ```text
//! return = (price[i + h] - price[i]) / price[i]    if i + h < len
//!          unavailable                              otherwise
//! ```
//!
//! Unavailable is `None`, never zero and never NaN, so a short tail can be
//! filtered downstream without being confused with a flat return.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StudyError};
use crate::peaks::AnchorIndexSet;
use crate::series::PriceSeries;

/// A named forward horizon measured in index steps
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct HoldingPeriod {
    pub label: String,
    pub steps: usize,
}

impl HoldingPeriod {
    pub fn new(label: impl Into<String>, steps: usize) -> Self {
        Self {
            label: label.into(),
            steps,
        }
    }
}

/// Ordered label → steps mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct HoldingPeriods(Vec<HoldingPeriod>);

impl Default for HoldingPeriods {
    /// 3M, 6M, 12M, 24M, 48M at 91, 182, 365, 730, 1460 steps
    fn default() -> Self {
        Self(vec![
            HoldingPeriod::new("3M", 91),
            HoldingPeriod::new("6M", 182),
            HoldingPeriod::new("12M", 365),
            HoldingPeriod::new("24M", 730),
            HoldingPeriod::new("48M", 1460),
        ])
    }
}

impl HoldingPeriods {
    /// Build from (label, steps) pairs; labels must be unique
    pub fn new<S: Into<String>>(periods: impl IntoIterator<Item = (S, usize)>) -> Result<Self> {
        let periods = Self(
            periods
                .into_iter()
                .map(|(label, steps)| HoldingPeriod::new(label, steps))
                .collect(),
        );
        periods.validate()?;
        Ok(periods)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.0 {
            if p.label.is_empty() {
                return Err(StudyError::validation("holding period label must not be empty"));
            }
            if !seen.insert(p.label.as_str()) {
                return Err(StudyError::validation(format!("duplicate holding period label '{}'", p.label)));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HoldingPeriod> {
        self.0.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Forward return from one anchor over one holding period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardReturnRow {
    pub index: usize,
    pub date: NaiveDate,
    pub holding_period: String,
    /// `None` when the horizon runs past the end of the series
    pub value: Option<f64>,
}

/// Return from `index` to `index + steps`, if that position exists
pub fn forward_return(prices: &[f64], index: usize, steps: usize) -> Option<f64> {
    let entry = *prices.get(index)?;
    let exit = *prices.get(index.checked_add(steps)?)?;
    Some((exit - entry) / entry)
}

/// Forward returns for every anchor (or, with `complement`, every non-anchor)
/// position, one row per (position, holding period) in period order.
pub fn forward_returns(
    prices: &PriceSeries,
    anchors: &AnchorIndexSet,
    horizons: &HoldingPeriods,
    complement: bool,
) -> Result<Vec<ForwardReturnRow>> {
    if anchors.series_len() != prices.len() {
        return Err(StudyError::invalid_input(format!(
            "anchor set built for length {} but series {} has length {}",
            anchors.series_len(),
            prices.symbol,
            prices.len()
        )));
    }

    let selected = if complement { anchors.complement() } else { anchors.clone() };
    let values = prices.prices();
    let dates = prices.dates();

    let rows: Vec<ForwardReturnRow> = selected
        .indices()
        .iter()
        .flat_map(|&index| {
            horizons.iter().map(move |h| ForwardReturnRow {
                index,
                date: dates[index],
                holding_period: h.label.clone(),
                value: forward_return(values, index, h.steps),
            })
        })
        .collect();

    debug!(
        series = %prices.symbol,
        complement,
        positions = selected.len(),
        rows = rows.len(),
        "computed forward returns"
    );
    Ok(rows)
}
