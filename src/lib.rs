//! # Leveraged Highs
//!
//! Simulates daily-rebalanced leveraged products from unleveraged price
//! history, blends them into a weighted portfolio, and compares forward
//! returns taken at new highs against those taken everywhere else.
//!
//! ## Pipeline
//! - [`leverage`]: leveraged price path from daily returns
//! - [`portfolio`]: align, weight and sum several leveraged legs
//! - [`peaks`]: all-time-high / 52-week-high positions, dilated by a radius
//! - [`forward`]: returns over fixed holding periods from anchor positions
//! - [`aggregate`]: peak vs non-peak groups melted into one long table
//! - [`study`]: the whole chain from a [`PriceSource`] and a [`StudyConfig`]
//!
//! ## Example
//! ```
//! use chrono::NaiveDate;
//! use leveraged_highs::{aggregate, compose, HoldingPeriods, PeakMode, PriceSeries};
//!
//! let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
//! let qqq = PriceSeries::from_daily("QQQ", start, vec![100.0, 102.0, 101.0, 104.0, 103.0, 105.0]);
//!
//! let portfolio = compose(&[qqq], &[3.0], &[1.0]).unwrap();
//! let horizons = HoldingPeriods::new([("1D", 1), ("2D", 2)]).unwrap();
//! let table = aggregate(&portfolio.price_series(), &[0, 1], PeakMode::RunningMax, &horizons).unwrap();
//!
//! assert_eq!(table.groups().len(), 3);
//! ```
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod aggregate;
pub mod common;
pub mod error;
pub mod forward;
pub mod leverage;
pub mod peaks;
pub mod portfolio;
pub mod series;
pub mod source;
pub mod study;

pub use aggregate::{aggregate, DistributionSummary, GroupLabel, LabeledReturn, LabeledReturnTable, Partition};
pub use error::{Result, StudyError};
pub use forward::{forward_return, forward_returns, ForwardReturnRow, HoldingPeriod, HoldingPeriods};
pub use leverage::{leg_label, simulate, simulate_weighted, LeveragedSeries, WeightedLeg};
pub use peaks::{detect, detect_named, AnchorIndexSet, PeakMode, FIFTY_TWO_WEEK_LOOKBACK};
pub use portfolio::{compose, validate_allocation, AssetColumns, PortfolioSeries, WEIGHT_SUM_TOLERANCE};
pub use series::{PriceSeries, ReturnSeries};
pub use source::{fetch_series, DailyBar, InMemorySource, ParquetSource, PriceSource};
pub use study::{run_study, StudyConfig, StudyReport};
