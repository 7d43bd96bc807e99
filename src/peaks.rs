//! Peak Detector
//!
//! Flags positions where a price series sets a new high, then optionally
//! dilates each flagged position to a ±radius neighborhood.
//!
//! Two rules:
//! - `running_max`: strict all-time high, `price[i] > max(price[..i])`.
//! - `rolling_window_max`: 52-week high, `price[i] >= max(price[i-365..=i])`.
//!
//! The two rules differ on ties (strict vs non-strict). Both are kept as they
//! are; a flat stretch at the top of the trailing window keeps qualifying
//! under the rolling rule while only its first day counts as an all-time high.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::f64_values;
use crate::error::{Result, StudyError};
use crate::series::PriceSeries;

/// Trailing positions (besides the current one) in the 52-week window
pub const FIFTY_TWO_WEEK_LOOKBACK: usize = 365;

/// New-high rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakMode {
    /// Strictly above every earlier price
    RunningMax,
    /// At least the trailing 52-week maximum
    RollingWindowMax,
}

impl PeakMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeakMode::RunningMax => "running_max",
            PeakMode::RollingWindowMax => "rolling_window_max",
        }
    }
}

impl fmt::Display for PeakMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeakMode {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running_max" => Ok(PeakMode::RunningMax),
            "rolling_window_max" => Ok(PeakMode::RollingWindowMax),
            other => Err(StudyError::validation(format!(
                "unrecognized peak-detection mode '{}' (expected running_max or rolling_window_max)",
                other
            ))),
        }
    }
}

/// Sorted, deduplicated positions into a series of length `series_len`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorIndexSet {
    indices: Vec<usize>,
    series_len: usize,
}

impl AnchorIndexSet {
    /// Build from arbitrary positions; out-of-range positions are rejected
    pub fn new(indices: impl IntoIterator<Item = usize>, series_len: usize) -> Result<Self> {
        let set: BTreeSet<usize> = indices.into_iter().collect();
        if let Some(&last) = set.iter().next_back() {
            if last >= series_len {
                return Err(StudyError::invalid_input(format!(
                    "anchor index {} out of range for series of length {}",
                    last, series_len
                )));
            }
        }
        Ok(Self {
            indices: set.into_iter().collect(),
            series_len,
        })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn series_len(&self) -> usize {
        self.series_len
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Every position of the series not in this set
    pub fn complement(&self) -> AnchorIndexSet {
        let mut anchors = self.indices.iter().peekable();
        let indices = (0..self.series_len)
            .filter(|i| {
                if anchors.peek() == Some(&i) {
                    anchors.next();
                    false
                } else {
                    true
                }
            })
            .collect();
        AnchorIndexSet {
            indices,
            series_len: self.series_len,
        }
    }

    /// Union of `[i - radius, i + radius]` over all members, clipped to the
    /// series bounds. Builds a fresh set on every call.
    pub fn dilate(&self, radius: usize) -> AnchorIndexSet {
        if radius == 0 || self.series_len == 0 {
            return self.clone();
        }

        let last = self.series_len - 1;
        let expanded: BTreeSet<usize> = self
            .indices
            .iter()
            .flat_map(|&i| i.saturating_sub(radius)..=(i + radius).min(last))
            .collect();

        AnchorIndexSet {
            indices: expanded.into_iter().collect(),
            series_len: self.series_len,
        }
    }
}

/// Detect new-high positions under `mode`, dilated by `window_radius`
pub fn detect(prices: &PriceSeries, mode: PeakMode, window_radius: usize) -> Result<AnchorIndexSet> {
    let values = prices.prices();
    let base = match mode {
        PeakMode::RunningMax => running_max_indices(values),
        PeakMode::RollingWindowMax => rolling_max_indices(values, FIFTY_TWO_WEEK_LOOKBACK)?,
    };

    let anchors = AnchorIndexSet {
        indices: base,
        series_len: values.len(),
    }
    .dilate(window_radius);

    debug!(
        series = %prices.symbol,
        %mode,
        window_radius,
        anchors = anchors.len(),
        "detected peaks"
    );
    Ok(anchors)
}

/// [`detect`] with the mode given by name; unknown names are a validation error
pub fn detect_named(prices: &PriceSeries, mode: &str, window_radius: usize) -> Result<AnchorIndexSet> {
    detect(prices, mode.parse()?, window_radius)
}

/// Positions that strictly exceed every earlier value
fn running_max_indices(values: &[f64]) -> Vec<usize> {
    let mut current = f64::NEG_INFINITY;
    let mut result = Vec::new();

    for (i, &v) in values.iter().enumerate() {
        if v > current {
            current = v;
            result.push(i);
        }
    }
    result
}

/// Positions at or above the maximum of the trailing `lookback + 1` values
fn rolling_max_indices(values: &[f64], lookback: usize) -> Result<Vec<usize>> {
    if values.is_empty() {
        return Ok(vec![]);
    }

    let trailing = trailing_max(values, lookback)?;
    Ok((0..values.len()).filter(|&i| values[i] >= trailing[i]).collect())
}

/// Max over `[max(0, i - lookback), i]`; partial windows at the start count
fn trailing_max(values: &[f64], lookback: usize) -> PolarsResult<Vec<f64>> {
    let column: Vec<Option<f64>> = values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();

    let df = df!("price" => column)?
        .lazy()
        .select([col("price")
            .rolling_max(RollingOptionsFixedWindow {
                window_size: lookback + 1,
                min_periods: 1,
                ..Default::default()
            })
            .alias("trailing_max")])
        .collect()?;

    f64_values(&df, "trailing_max")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(prices: Vec<f64>) -> PriceSeries {
        PriceSeries::from_daily("P", NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), prices)
    }

    #[test]
    fn test_running_max_is_strict() {
        let s = series(vec![1.0, 3.0, 2.0, 5.0, 4.0, 5.0]);
        let a = detect(&s, PeakMode::RunningMax, 0).unwrap();
        assert_eq!(a.indices(), &[0, 1, 3]);
    }

    #[test]
    fn test_rolling_max_counts_ties() {
        let s = series(vec![1.0, 3.0, 2.0, 5.0, 4.0, 5.0]);
        let a = detect(&s, PeakMode::RollingWindowMax, 0).unwrap();
        assert_eq!(a.indices(), &[0, 1, 3, 5]);
    }

    #[test]
    fn test_rolling_max_forgets_old_highs() {
        // A spike at 0, then a plateau below it for longer than the window
        let mut prices = vec![100.0];
        prices.extend(std::iter::repeat(50.0).take(FIFTY_TWO_WEEK_LOOKBACK + 5));
        let s = series(prices);

        let a = detect(&s, PeakMode::RollingWindowMax, 0).unwrap();
        // Index 365 still sees the spike; 366 is the first clear of it
        assert!(!a.contains(FIFTY_TWO_WEEK_LOOKBACK));
        assert!(a.contains(FIFTY_TWO_WEEK_LOOKBACK + 1));

        let ath = detect(&s, PeakMode::RunningMax, 0).unwrap();
        assert_eq!(ath.indices(), &[0]);
    }

    #[test]
    fn test_dilation() {
        let a = AnchorIndexSet::new([2], 6).unwrap();
        assert_eq!(a.dilate(1).indices(), &[1, 2, 3]);

        // Clipped at both ends
        let edges = AnchorIndexSet::new([0, 5], 6).unwrap();
        assert_eq!(edges.dilate(1).indices(), &[0, 1, 4, 5]);
        assert_eq!(edges.dilate(10).indices(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_dilation_does_not_mutate_source() {
        let a = AnchorIndexSet::new([3], 10).unwrap();
        let first = a.dilate(2);
        let second = a.dilate(1);
        assert_eq!(a.indices(), &[3]);
        assert_eq!(first.indices(), &[1, 2, 3, 4, 5]);
        assert_eq!(second.indices(), &[2, 3, 4]);
    }

    #[test]
    fn test_detect_with_radius() {
        let s = series(vec![5.0, 1.0, 6.0, 2.0, 1.0, 1.0]);
        let a = detect(&s, PeakMode::RunningMax, 1).unwrap();
        // Base {0, 2} -> {0,1} ∪ {1,2,3}
        assert_eq!(a.indices(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_complement() {
        let a = AnchorIndexSet::new([0, 2], 5).unwrap();
        assert_eq!(a.complement().indices(), &[1, 3, 4]);
        let none = AnchorIndexSet::new(Vec::new(), 3).unwrap();
        assert_eq!(none.complement().indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_new_sorts_dedups_and_checks_bounds() {
        let a = AnchorIndexSet::new([4, 1, 4, 2], 5).unwrap();
        assert_eq!(a.indices(), &[1, 2, 4]);
        assert!(AnchorIndexSet::new([5], 5).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("running_max".parse::<PeakMode>().unwrap(), PeakMode::RunningMax);
        assert_eq!("rolling_window_max".parse::<PeakMode>().unwrap(), PeakMode::RollingWindowMax);
        assert!("ath".parse::<PeakMode>().unwrap_err().is_validation());

        let s = series(vec![1.0, 2.0]);
        assert!(detect_named(&s, "max", 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_empty_series() {
        let s = series(vec![]);
        assert!(detect(&s, PeakMode::RunningMax, 3).unwrap().is_empty());
        assert!(detect(&s, PeakMode::RollingWindowMax, 3).unwrap().is_empty());
    }
}
