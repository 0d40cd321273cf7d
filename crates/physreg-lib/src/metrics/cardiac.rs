use crate::{
    error::{MetricError, Result},
    signal::{
        bracketing_pair, sample_times, validate_events, validate_sample_rate, window_samples,
    },
    utils::{self, CentralMeasure, WindowEdge},
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Heart-rate options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    /// Centered moving-average window (seconds); `None` keeps the beat-to-beat rate.
    pub smoothing_window_s: Option<f64>,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            smoothing_window_s: Some(6.0),
        }
    }
}

/// Statistic summarising the beats inside an HRV window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HrvStatistic {
    /// Sample standard deviation of beat intervals (seconds).
    #[default]
    Sdnn,
    /// Root mean square of successive interval differences (seconds).
    Rmssd,
    /// Sample standard deviation of the instantaneous rate (beats per minute).
    RateStd,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrvConfig {
    pub window_s: f64,
    pub statistic: HrvStatistic,
}

impl Default for HrvConfig {
    fn default() -> Self {
        Self {
            window_s: 6.0,
            statistic: HrvStatistic::Sdnn,
        }
    }
}

/// Options of the windowed heart-beat interval regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HbiConfig {
    pub window_s: f64,
    pub central_measure: CentralMeasure,
}

impl Default for HbiConfig {
    fn default() -> Self {
        Self {
            window_s: 6.0,
            central_measure: CentralMeasure::Mean,
        }
    }
}

fn check_peaks(peaks: &[usize], n_samples: usize, fs: f64) -> Result<()> {
    validate_sample_rate(fs)?;
    validate_events(peaks, n_samples, "cardiac peaks")?;
    if peaks.len() < 2 {
        return Err(MetricError::insufficient(format!(
            "at least 2 cardiac peaks are needed, got {}",
            peaks.len()
        )));
    }
    Ok(())
}

/// Time between consecutive peaks, in seconds. Length is `peaks.len() - 1`.
pub fn heart_beat_interval(peaks: &[usize], fs: f64) -> Result<Vec<f64>> {
    check_peaks(peaks, usize::MAX, fs)?;
    Ok(peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / fs)
        .collect())
}

/// Heart rate in beats per minute at every sample of an `n_samples` waveform.
///
/// The rate is `60 / interval` of the beat interval around each sample, held
/// constant between peaks, then optionally smoothed with a centered mean.
pub fn heart_rate(
    n_samples: usize,
    peaks: &[usize],
    fs: f64,
    cfg: &HeartRateConfig,
) -> Result<Vec<f64>> {
    check_peaks(peaks, n_samples, fs)?;
    let ibi = heart_beat_interval(peaks, fs)?;
    let rate: Vec<f64> = (0..n_samples)
        .map(|i| 60.0 / ibi[bracketing_pair(peaks, i)])
        .collect();
    match cfg.smoothing_window_s {
        Some(window_s) => {
            let window = window_samples(window_s, fs)?;
            utils::sliding_window(&rate, window, WindowEdge::Mirror, utils::mean)
        }
        None => Ok(rate),
    }
}

/// Apply `stat` to the beat intervals found inside the centered window around every sample.
///
/// `stat` receives the intervals (seconds) between consecutive peaks inside
/// the window. Positions with fewer than two beats are NaN.
fn windowed_intervals<F>(
    n_samples: usize,
    peaks: &[usize],
    fs: f64,
    window_s: f64,
    stat: F,
) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    check_peaks(peaks, n_samples, fs)?;
    let window = window_samples(window_s, fs)?;
    let bounds = utils::window_bounds(n_samples, window)?;
    let mut out = Vec::with_capacity(n_samples);
    let mut intervals = Vec::new();
    for (lo, hi) in bounds {
        let start = peaks.partition_point(|&p| p < lo);
        let end = peaks.partition_point(|&p| p <= hi);
        let beats = &peaks[start..end];
        if beats.len() < 2 {
            out.push(f64::NAN);
            continue;
        }
        intervals.clear();
        intervals.extend(beats.windows(2).map(|w| (w[1] - w[0]) as f64 / fs));
        out.push(stat(&intervals));
    }
    let undefined = out.iter().filter(|v| v.is_nan()).count();
    if undefined > 0 {
        warn!("{undefined} of {n_samples} samples have fewer than 2 beats in their window");
    }
    Ok(out)
}

/// Heart-rate variability in a centered window around every sample.
///
/// Windows with fewer than two beats, or with a single interval, are NaN
/// rather than an error.
pub fn heart_rate_variability(
    n_samples: usize,
    peaks: &[usize],
    fs: f64,
    cfg: &HrvConfig,
) -> Result<Vec<f64>> {
    windowed_intervals(n_samples, peaks, fs, cfg.window_s, |ibi| match cfg.statistic {
        HrvStatistic::Sdnn => utils::sample_std_dev(ibi),
        HrvStatistic::Rmssd => {
            if ibi.len() < 2 {
                return f64::NAN;
            }
            let diffs: Vec<f64> = ibi.windows(2).map(|w| w[1] - w[0]).collect();
            utils::rms(&diffs)
        }
        HrvStatistic::RateStd => {
            let rates: Vec<f64> = ibi.iter().map(|d| 60.0 / d).collect();
            utils::sample_std_dev(&rates)
        }
    })
}

/// Central measure of the beat intervals (seconds) in a centered window around every sample.
pub fn heart_beat_interval_series(
    n_samples: usize,
    peaks: &[usize],
    fs: f64,
    cfg: &HbiConfig,
) -> Result<Vec<f64>> {
    windowed_intervals(n_samples, peaks, fs, cfg.window_s, |ibi| {
        cfg.central_measure.apply(ibi)
    })
}

/// Wrap an angle into `[0, 2π)`.
pub(crate) fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Cardiac phase at arbitrary `times` given peak times, both in seconds.
///
/// Between peaks the phase rises linearly from 0 to 2π; outside the peak span
/// the nearest complete cycle is extrapolated and wrapped.
pub fn cardiac_phase_at(peak_times: &[f64], times: &[f64]) -> Result<Vec<f64>> {
    if peak_times.len() < 2 {
        return Err(MetricError::insufficient(format!(
            "at least 2 cardiac peaks are needed, got {}",
            peak_times.len()
        )));
    }
    if peak_times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(MetricError::invalid("cardiac peak times must be strictly increasing"));
    }
    let last = peak_times.len() - 1;
    Ok(times
        .iter()
        .map(|&t| {
            let k = peak_times.partition_point(|&p| p <= t);
            let (prev, next) = if k == 0 {
                (peak_times[0], peak_times[1])
            } else if k > last {
                (peak_times[last - 1], peak_times[last])
            } else {
                (peak_times[k - 1], peak_times[k])
            };
            let anchor = if k > last { peak_times[last] } else { prev };
            wrap_phase(TAU * (t - anchor) / (next - prev))
        })
        .collect())
}

/// Cardiac phase in `[0, 2π)` for every sample of an `n_samples` waveform.
pub fn cardiac_phase(n_samples: usize, peaks: &[usize], fs: f64) -> Result<Vec<f64>> {
    check_peaks(peaks, n_samples, fs)?;
    let peak_times: Vec<f64> = peaks.iter().map(|&p| p as f64 / fs).collect();
    cardiac_phase_at(&peak_times, &sample_times(n_samples, fs))
}
