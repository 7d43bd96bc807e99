//! End-to-end study: fetch → compose → detect → forward returns → table.
//!
//! ```no_run
//! use leveraged_highs::{run_study, ParquetSource, StudyConfig};
//!
//! let config = StudyConfig::from_json(r#"{
//!     "tickers": ["QQQ", "TLT"],
//!     "leverages": [3.0, 3.0],
//!     "weights": [0.6, 0.4],
//!     "mode": "rolling_window_max",
//!     "windows": [0, 5, 20]
//! }"#)?;
//!
//! let report = run_study(&ParquetSource::new("data/"), &config)?;
//! for s in report.table.summarize() {
//!     println!("{} {} median={:?}", s.holding_period, s.group, s.median);
//! }
//! # Ok::<(), leveraged_highs::StudyError>(())
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{aggregate, LabeledReturnTable};
use crate::error::{Result, StudyError};
use crate::forward::HoldingPeriods;
use crate::peaks::PeakMode;
use crate::portfolio::{compose, validate_allocation, PortfolioSeries};
use crate::series::PriceSeries;
use crate::source::{fetch_series, PriceSource};

fn default_mode() -> String {
    PeakMode::RunningMax.as_str().to_string()
}

fn default_windows() -> Vec<usize> {
    vec![0]
}

/// Everything one study run needs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyConfig {
    pub tickers: Vec<String>,
    pub leverages: Vec<f64>,
    pub weights: Vec<f64>,
    /// `running_max` or `rolling_window_max`
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Dilation radii, one peak group each
    #[serde(default = "default_windows")]
    pub windows: Vec<usize>,
    #[serde(default)]
    pub holding_periods: HoldingPeriods,
}

impl StudyConfig {
    /// Config with default mode, windows and holding periods
    pub fn new(tickers: Vec<String>, leverages: Vec<f64>, weights: Vec<f64>) -> Self {
        Self {
            tickers,
            leverages,
            weights,
            mode: default_mode(),
            windows: default_windows(),
            holding_periods: HoldingPeriods::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn peak_mode(&self) -> Result<PeakMode> {
        self.mode.parse()
    }

    /// Shape checks that need no data
    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(StudyError::validation("at least one ticker is required"));
        }
        if let Some(t) = self.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(StudyError::validation(format!("blank ticker symbol '{}'", t)));
        }
        validate_allocation(self.tickers.len(), &self.leverages, &self.weights)?;
        self.peak_mode()?;
        if self.windows.is_empty() {
            return Err(StudyError::validation("at least one window radius is required"));
        }
        self.holding_periods.validate()
    }
}

/// Output of [`run_study`]
#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    pub portfolio: PortfolioSeries,
    pub table: LabeledReturnTable,
}

/// Run the full pipeline over data from `source`.
///
/// The config is validated before any fetch. Each distinct symbol is fetched
/// once; a `DataUnavailable` from the source fails the run as-is.
pub fn run_study(source: &dyn PriceSource, config: &StudyConfig) -> Result<StudyReport> {
    config.validate()?;
    let mode = config.peak_mode()?;

    let mut fetched: HashMap<&str, PriceSeries> = HashMap::new();
    let mut series = Vec::with_capacity(config.tickers.len());
    for symbol in &config.tickers {
        let s = match fetched.get(symbol.as_str()) {
            Some(s) => s.clone(),
            None => {
                let s = fetch_series(source, symbol)?;
                fetched.insert(symbol.as_str(), s.clone());
                s
            }
        };
        series.push(s);
    }
    info!(symbols = fetched.len(), "fetched price histories");

    let portfolio = compose(&series, &config.leverages, &config.weights)?;
    let table = aggregate(&portfolio.price_series(), &config.windows, mode, &config.holding_periods)?;

    info!(
        rows = portfolio.len(),
        groups = table.groups().len(),
        returns = table.len(),
        "study complete"
    );
    Ok(StudyReport { portfolio, table })
}
