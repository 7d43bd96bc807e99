//! Common utilities shared across pipeline modules

use polars::prelude::*;

/// Calculate the mean of a slice
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Find the maximum value in a slice
#[inline]
pub fn max(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

/// Find the minimum value in a slice
#[inline]
pub fn min(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

/// A usable price: finite and strictly positive
#[inline]
pub fn is_valid_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Carry the last observed value forward over NaN gaps.
///
/// Leading NaNs have nothing to carry and stay NaN; callers decide whether
/// that is an error.
pub fn forward_fill(values: &[f64]) -> Vec<f64> {
    let mut last = f64::NAN;
    values
        .iter()
        .map(|&v| {
            if !v.is_nan() {
                last = v;
            }
            last
        })
        .collect()
}

/// Count NaN entries
#[inline]
pub fn count_missing(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}

/// Linear-interpolated quantile of an ascending-sorted slice.
///
/// Same interpolation as numpy/pandas default (`linear`). Returns NaN for an
/// empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }

    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Pull a Float64 column out of a collected frame, nulls as NaN
pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    Ok(df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Pull an Int32 column out of a collected frame
pub fn i32_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<i32>> {
    df.column(name)?
        .i32()?
        .into_iter()
        .map(|v| v.ok_or_else(|| PolarsError::ComputeError(format!("null in {}", name).into())))
        .collect()
}
