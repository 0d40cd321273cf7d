use crate::error::{MetricError, Result};
use crate::signal::validate_sample_rate;
use ndarray::Array2;

/// Linear interpolation of `(xp, fp)` at `x`, holding the first/last value outside `xp`.
///
/// `xp` must be sorted ascending and have the same length as `fp`.
pub fn interp_hold(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return vec![f64::NAN; x.len()];
    }
    let last = xp.len() - 1;
    x.iter()
        .map(|&t| {
            if t <= xp[0] {
                return fp[0];
            }
            if t >= xp[last] {
                return fp[last];
            }
            let hi = xp.partition_point(|&v| v <= t);
            let lo = hi - 1;
            let span = xp[hi] - xp[lo];
            if span <= 0.0 {
                fp[lo]
            } else {
                fp[lo] + (t - xp[lo]) / span * (fp[hi] - fp[lo])
            }
        })
        .collect()
}

fn volume_count(n_samples: usize, fs: f64, tr: f64) -> Result<usize> {
    validate_sample_rate(fs)?;
    if !(tr.is_finite() && tr > 0.0) {
        return Err(MetricError::invalid(format!("TR must be positive, got {tr}")));
    }
    let n = (n_samples as f64 / (fs * tr)).round() as usize;
    if n == 0 {
        return Err(MetricError::insufficient(format!(
            "{n_samples} samples at {fs} Hz do not cover a single TR of {tr} s"
        )));
    }
    Ok(n)
}

/// Resample a series recorded at `fs` onto volume onsets `k * tr`, `k = 0, 1, ...`.
///
/// The number of volumes is the recording duration divided by the TR, rounded.
/// Onsets past the last recorded sample hold its value.
pub fn resample_to_tr(series: &[f64], fs: f64, tr: f64) -> Result<Vec<f64>> {
    let n_vol = volume_count(series.len(), fs, tr)?;
    let times: Vec<f64> = (0..series.len()).map(|i| i as f64 / fs).collect();
    let onsets: Vec<f64> = (0..n_vol).map(|k| k as f64 * tr).collect();
    Ok(interp_hold(&onsets, &times, series))
}

/// Column-wise [`resample_to_tr`].
pub fn resample_columns(metric: &Array2<f64>, fs: f64, tr: f64) -> Result<Array2<f64>> {
    let (rows, cols) = metric.dim();
    let n_vol = volume_count(rows, fs, tr)?;
    let mut out = Array2::<f64>::zeros((n_vol, cols));
    for (j, column) in metric.columns().into_iter().enumerate() {
        let resampled = resample_to_tr(&column.to_vec(), fs, tr)?;
        for (dst, src) in out.column_mut(j).iter_mut().zip(resampled) {
            *dst = src;
        }
    }
    Ok(out)
}

/// Keep the first `ntp` rows; asking for more rows than exist is an error.
pub fn fit_timepoints(resampled: Array2<f64>, ntp: Option<usize>) -> Result<Array2<f64>> {
    let Some(ntp) = ntp else {
        return Ok(resampled);
    };
    let rows = resampled.nrows();
    if ntp > rows {
        return Err(MetricError::insufficient(format!(
            "requested {ntp} timepoints but only {rows} are available after resampling"
        )));
    }
    Ok(resampled.slice(ndarray::s![..ntp, ..]).to_owned())
}
