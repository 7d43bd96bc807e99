//! Price data sources
//!
//! The pipeline only needs "daily bars for a symbol". `PriceSource` is that
//! seam: `ParquetSource` reads one `<SYMBOL>.parquet` file per ticker from a
//! directory, `InMemorySource` serves bars held in memory (tests, callers
//! that already fetched their data).
//!
//! Parquet layout: `Date` (timestamp or date32), `Open`, `High`, `Low`,
//! `Close`, `Adj Close`, `Volume`. Null price cells come back as `NaN`.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{
    Array, ArrayRef, Date32Array, Float64Array, Int64Array, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StudyError};
use crate::series::PriceSeries;

/// One trading day of OHLCV data
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl DailyBar {
    /// Bar with every price field set to `adj_close`
    pub fn flat(date: NaiveDate, adj_close: f64) -> Self {
        Self {
            date,
            open: adj_close,
            high: adj_close,
            low: adj_close,
            close: adj_close,
            adj_close,
            volume: 0.0,
        }
    }
}

/// Anything that can hand back a symbol's daily history
pub trait PriceSource {
    /// Daily bars for `symbol`. `DataUnavailable` when the source has none.
    fn daily_bars(&self, symbol: &str) -> Result<Vec<DailyBar>>;
}

/// Bars keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bars: HashMap<String, Vec<DailyBar>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<DailyBar>) {
        self.bars.insert(symbol.into(), bars);
    }

    /// Register a plain adjusted-close history
    pub fn insert_series(&mut self, series: &PriceSeries) {
        let bars = series
            .dates()
            .iter()
            .zip(series.prices())
            .map(|(&d, &p)| DailyBar::flat(d, p))
            .collect();
        self.insert(series.symbol.clone(), bars);
    }

    pub fn with_series(mut self, series: &PriceSeries) -> Self {
        self.insert_series(series);
        self
    }
}

impl PriceSource for InMemorySource {
    fn daily_bars(&self, symbol: &str) -> Result<Vec<DailyBar>> {
        match self.bars.get(symbol) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            Some(_) => Err(StudyError::data_unavailable(symbol, "no rows")),
            None => Err(StudyError::data_unavailable(symbol, "unknown symbol")),
        }
    }
}

/// Directory of `<SYMBOL>.parquet` files
#[derive(Debug, Clone)]
pub struct ParquetSource {
    dir: PathBuf,
}

impl ParquetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", symbol))
    }
}

impl PriceSource for ParquetSource {
    fn daily_bars(&self, symbol: &str) -> Result<Vec<DailyBar>> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(StudyError::data_unavailable(
                symbol,
                format!("{} not found", path.display()),
            ));
        }

        let bars = read_parquet_bars(&path).map_err(|e| StudyError::data_unavailable(symbol, e.to_string()))?;
        if bars.is_empty() {
            return Err(StudyError::data_unavailable(symbol, "no rows"));
        }

        debug!(symbol, rows = bars.len(), path = %path.display(), "loaded daily bars");
        Ok(bars)
    }
}

fn read_parquet_bars(path: &Path) -> Result<Vec<DailyBar>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut bars = Vec::new();
    for batch in reader {
        let batch = batch?;
        let dates = date_column(&batch)?;
        let open = price_column(&batch, "Open")?;
        let high = price_column(&batch, "High")?;
        let low = price_column(&batch, "Low")?;
        let close = price_column(&batch, "Close")?;
        let adj_close = price_column(&batch, "Adj Close")?;
        let volume = price_column(&batch, "Volume")?;

        for i in 0..batch.num_rows() {
            let Some(date) = dates[i] else {
                warn!(path = %path.display(), row = i, "skipping row with null date");
                continue;
            };
            bars.push(DailyBar {
                date,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                adj_close: adj_close[i],
                volume: volume[i],
            });
        }
    }
    Ok(bars)
}

fn require_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StudyError::invalid_input(format!("missing column '{}'", name)))
}

/// Float or integer column as f64, nulls as NaN
fn price_column(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let col = require_column(batch, name)?;

    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        return Ok(arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect());
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return Ok(arr.iter().map(|v| v.map_or(f64::NAN, |x| x as f64)).collect());
    }
    Err(StudyError::invalid_input(format!(
        "column '{}' has unsupported type {}",
        name,
        col.data_type()
    )))
}

fn date_column(batch: &RecordBatch) -> Result<Vec<Option<NaiveDate>>> {
    let col = require_column(batch, "Date")?;
    let any = col.as_any();

    let from_nanos = |ns: i64| DateTime::from_timestamp_nanos(ns).date_naive();
    let from_micros = |us: i64| DateTime::from_timestamp_micros(us).map(|dt| dt.date_naive());
    let from_millis = |ms: i64| DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive());

    let dates = match col.data_type() {
        DataType::Timestamp(TimeUnit::Nanosecond, _) => any
            .downcast_ref::<TimestampNanosecondArray>()
            .map(|a| a.iter().map(|v| v.map(from_nanos)).collect()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => any
            .downcast_ref::<TimestampMicrosecondArray>()
            .map(|a| a.iter().map(|v| v.and_then(from_micros)).collect()),
        DataType::Timestamp(TimeUnit::Millisecond, _) => any
            .downcast_ref::<TimestampMillisecondArray>()
            .map(|a| a.iter().map(|v| v.and_then(from_millis)).collect()),
        DataType::Date32 => any
            .downcast_ref::<Date32Array>()
            .map(|a| (0..a.len()).map(|i| if a.is_null(i) { None } else { a.value_as_date(i) }).collect()),
        _ => None,
    };

    dates.ok_or_else(|| StudyError::invalid_input(format!("Date column has unsupported type {}", col.data_type())))
}

/// Adjusted-close series for `symbol`, sorted by date.
///
/// Duplicate dates are `InvalidInput`; missing prices stay `NaN`.
pub fn fetch_series(source: &dyn PriceSource, symbol: &str) -> Result<PriceSeries> {
    let mut bars = source.daily_bars(symbol)?;
    bars.sort_by_key(|b| b.date);

    if let Some(w) = bars.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(StudyError::invalid_input(format!("{}: duplicate date {}", symbol, w[0].date)));
    }

    let (dates, prices) = bars.into_iter().map(|b| (b.date, b.adj_close)).unzip();
    PriceSeries::new(symbol, dates, prices)
}
