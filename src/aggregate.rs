//! Comparative Aggregator
//!
//! Runs peak detection and forward returns for each window radius and melts
//! the results into one long table of `{Group, HoldingPeriod, Return}`
//! records, the shape a grouped box plot or summary consumes.
//!
//! Every radius yields a peak group. The non-peak baseline is computed once,
//! at the smallest radius, since the complement set is large and a second
//! baseline at a wider radius adds little.

use std::fmt;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::common::{max, mean, min, quantile_sorted};
use crate::error::{Result, StudyError};
use crate::forward::{forward_returns, ForwardReturnRow, HoldingPeriods};
use crate::peaks::{detect, PeakMode};
use crate::series::PriceSeries;

/// Which side of the peak/non-peak split a group holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Partition {
    Peak,
    NonPeak,
}

/// Identifies one result set: peak rule, window radius, partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupLabel {
    pub mode: PeakMode,
    pub window: usize,
    pub partition: Partition,
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partition {
            Partition::Peak => write!(f, "{} (Window={})", self.mode, self.window),
            Partition::NonPeak => write!(f, "Non-{} (Window={})", self.mode, self.window),
        }
    }
}

/// One melted record: a (position, holding period) pair tagged with its group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledReturn {
    #[serde(rename = "Group")]
    pub group: String,
    #[serde(rename = "HoldingPeriod")]
    pub holding_period: String,
    #[serde(rename = "Return")]
    pub value: Option<f64>,
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
}

/// Box-plot numbers for one (HoldingPeriod, Group) distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub holding_period: String,
    pub group: String,
    /// Available returns
    pub count: usize,
    /// Rows whose horizon ran past the end of the series
    pub unavailable: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub q3: Option<f64>,
    pub max: Option<f64>,
}

/// Long-form table of labeled forward returns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabeledReturnTable {
    pub rows: Vec<LabeledReturn>,
}

impl LabeledReturnTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn extend(&mut self, group: GroupLabel, rows: Vec<ForwardReturnRow>) {
        let group = group.to_string();
        self.rows.extend(rows.into_iter().map(|r| LabeledReturn {
            group: group.clone(),
            holding_period: r.holding_period,
            value: r.value,
            index: r.index,
            date: r.date,
        }));
    }

    /// Distinct group labels in emission order
    pub fn groups(&self) -> Vec<&str> {
        distinct(self.rows.iter().map(|r| r.group.as_str()))
    }

    /// Distinct holding-period labels in emission order
    pub fn holding_periods(&self) -> Vec<&str> {
        distinct(self.rows.iter().map(|r| r.holding_period.as_str()))
    }

    pub fn for_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a LabeledReturn> + 'a {
        self.rows.iter().filter(move |r| r.group == group)
    }

    /// Columns `Group`, `HoldingPeriod`, `Return` (nullable), `Index`, `Date`
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let groups: Vec<&str> = self.rows.iter().map(|r| r.group.as_str()).collect();
        let periods: Vec<&str> = self.rows.iter().map(|r| r.holding_period.as_str()).collect();
        let values: Vec<Option<f64>> = self.rows.iter().map(|r| r.value).collect();
        let indices: Vec<u64> = self.rows.iter().map(|r| r.index as u64).collect();
        let dates: Vec<String> = self.rows.iter().map(|r| r.date.format("%Y-%m-%d").to_string()).collect();

        df!(
            "Group" => groups,
            "HoldingPeriod" => periods,
            "Return" => values,
            "Index" => indices,
            "Date" => dates
        )
    }

    /// Write the long table to a parquet file for the plotting side
    pub fn write_parquet(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let file = File::create(path)?;
        ParquetWriter::new(file).finish(&mut df)?;
        info!(path = %path.display(), rows = df.height(), "wrote labeled returns");
        Ok(())
    }

    /// One summary per (HoldingPeriod, Group), periods outermost
    pub fn summarize(&self) -> Vec<DistributionSummary> {
        let groups = self.groups();
        let mut out = Vec::new();

        for period in self.holding_periods() {
            for &group in &groups {
                let mut available = Vec::new();
                let mut unavailable = 0;
                for r in self.rows.iter().filter(|r| r.group == group && r.holding_period == period) {
                    match r.value {
                        Some(v) => available.push(v),
                        None => unavailable += 1,
                    }
                }
                if available.is_empty() && unavailable == 0 {
                    continue;
                }

                available.sort_by(|a, b| a.total_cmp(b));
                let stat = |v: f64| (!available.is_empty()).then_some(v);
                out.push(DistributionSummary {
                    holding_period: period.to_string(),
                    group: group.to_string(),
                    count: available.len(),
                    unavailable,
                    mean: stat(mean(&available)),
                    min: stat(min(&available)),
                    q1: stat(quantile_sorted(&available, 0.25)),
                    median: stat(quantile_sorted(&available, 0.5)),
                    q3: stat(quantile_sorted(&available, 0.75)),
                    max: stat(max(&available)),
                });
            }
        }
        out
    }
}

fn distinct<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen: Vec<&str> = Vec::new();
    for label in labels {
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    seen
}

/// Peak groups for every radius in `windows` (in the given order) plus one
/// non-peak group at the smallest radius, melted into one table.
pub fn aggregate(
    prices: &PriceSeries,
    windows: &[usize],
    mode: PeakMode,
    horizons: &HoldingPeriods,
) -> Result<LabeledReturnTable> {
    let min_window = *windows
        .iter()
        .min()
        .ok_or_else(|| StudyError::validation("at least one window radius is required"))?;
    horizons.validate()?;

    let mut table = LabeledReturnTable::default();
    let mut baseline_done = false;

    for &window in windows {
        let anchors = detect(prices, mode, window)?;

        let peak = GroupLabel {
            mode,
            window,
            partition: Partition::Peak,
        };
        table.extend(peak, forward_returns(prices, &anchors, horizons, false)?);

        if window == min_window && !baseline_done {
            let baseline = GroupLabel {
                mode,
                window,
                partition: Partition::NonPeak,
            };
            table.extend(baseline, forward_returns(prices, &anchors, horizons, true)?);
            baseline_done = true;
        }
    }

    info!(
        series = %prices.symbol,
        %mode,
        windows = windows.len(),
        rows = table.len(),
        "aggregated labeled returns"
    );
    Ok(table)
}
