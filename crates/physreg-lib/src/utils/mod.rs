//! Numeric primitives shared by every metric: mirror padding, sliding-window
//! reduction, lag expansion, convolution and resampling.

pub mod convolve;
pub mod resample;

pub use convolve::{
    convolve, convolve_and_rescale, convolve_columns, ConvolutionMode, Convolved, Rescale,
};
pub use resample::{fit_timepoints, interp_hold, resample_columns, resample_to_tr};

use crate::error::{MetricError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How windows that overhang the ends of a series are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowEdge {
    /// Mirror the series at both ends so every window is complete.
    #[default]
    Mirror,
    /// Shrink the window at the ends to the samples that exist.
    Truncate,
}

/// Statistic used to summarise the samples of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CentralMeasure {
    #[default]
    Mean,
    Median,
    Std,
}

impl CentralMeasure {
    /// Apply the measure; an empty slice yields NaN.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            CentralMeasure::Mean => mean(values),
            CentralMeasure::Median => median(values),
            CentralMeasure::Std => std_dev(values),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Sample standard deviation (`n - 1` denominator); NaN with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    (values.iter().map(|x| x * x).sum::<f64>() / values.len() as f64).sqrt()
}

/// Pad both ends with `pad` mirrored samples, edge sample included.
///
/// `[0, 1, 2, 3]` padded by 2 becomes `[1, 0, 0, 1, 2, 3, 3, 2]`.
pub fn mirror_pad(arr: &[f64], pad: usize) -> Result<Vec<f64>> {
    if pad >= arr.len() {
        return Err(MetricError::invalid(format!(
            "padding of {pad} samples needs a series longer than {} samples",
            arr.len()
        )));
    }
    let n = arr.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend(arr[..pad].iter().rev());
    out.extend_from_slice(arr);
    out.extend(arr[n - pad..].iter().rev());
    Ok(out)
}

fn check_window(window: usize) -> Result<()> {
    if window == 0 || window % 2 == 0 {
        return Err(MetricError::invalid(format!(
            "window must be a positive odd number of samples, got {window}"
        )));
    }
    Ok(())
}

/// Apply `reducer` over a centered window of `window` samples at every position.
///
/// The output has the same length as `arr`. Any reducer can be used, including
/// weighted ones that close over their own weights.
pub fn sliding_window<F>(arr: &[f64], window: usize, edge: WindowEdge, mut reducer: F) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> f64,
{
    check_window(window)?;
    let half = window / 2;
    match edge {
        WindowEdge::Mirror => {
            let padded = mirror_pad(arr, half)?;
            Ok(padded.windows(window).map(&mut reducer).collect())
        }
        WindowEdge::Truncate => {
            if arr.is_empty() {
                return Err(MetricError::invalid("cannot slide a window over an empty series"));
            }
            let n = arr.len();
            Ok((0..n)
                .map(|i| reducer(&arr[i.saturating_sub(half)..(i + half + 1).min(n)]))
                .collect())
        }
    }
}

/// Root-mean-square envelope over a centered odd window.
pub fn rms_envelope(arr: &[f64], window: usize) -> Result<Vec<f64>> {
    sliding_window(arr, window, WindowEdge::Mirror, rms)
}

/// First and last sample index covered by the truncated window around every sample.
pub(crate) fn window_bounds(n: usize, window: usize) -> Result<Vec<(usize, usize)>> {
    let idx: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let lo = sliding_window(&idx, window, WindowEdge::Truncate, |w| w[0])?;
    let hi = sliding_window(&idx, window, WindowEdge::Truncate, |w| w[w.len() - 1])?;
    Ok(lo
        .into_iter()
        .zip(hi)
        .map(|(a, b)| (a as usize, b as usize))
        .collect())
}

/// Shift `metric` by every lag, one column per lag.
///
/// Positive lags delay the series, negative lags advance it. Vacated samples
/// hold the nearest edge value.
pub fn apply_lags(metric: &[f64], lags: &[i64]) -> Result<Array2<f64>> {
    let n = metric.len();
    if n == 0 {
        return Err(MetricError::invalid("cannot lag an empty series"));
    }
    if lags.is_empty() {
        return Err(MetricError::invalid("lag set is empty"));
    }
    let mut out = Array2::<f64>::zeros((n, lags.len()));
    for (j, &lag) in lags.iter().enumerate() {
        let shift = lag.unsigned_abs() as usize;
        if shift >= n {
            return Err(MetricError::invalid(format!(
                "lag {lag} is out of range for a series of {n} samples"
            )));
        }
        let mut col = out.column_mut(j);
        for i in 0..n {
            col[i] = if lag >= 0 {
                if i >= shift {
                    metric[i - shift]
                } else {
                    metric[0]
                }
            } else if i + shift < n {
                metric[i + shift]
            } else {
                metric[n - 1]
            };
        }
    }
    Ok(out)
}

/// Convert lags in seconds to the nearest whole number of samples.
pub fn lags_to_samples(lags_s: &[f64], fs: f64) -> Result<Vec<i64>> {
    lags_s
        .iter()
        .map(|&lag| {
            if !lag.is_finite() {
                return Err(MetricError::invalid(format!("lag {lag} is not finite")));
            }
            Ok((lag * fs).round() as i64)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64, tol: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tol,
        "expected {expected}, got {actual} (diff {diff} > tol {tol})"
    );
}
