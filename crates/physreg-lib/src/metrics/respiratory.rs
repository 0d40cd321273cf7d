use crate::{
    error::{MetricError, Result},
    metrics::cardiac::wrap_phase,
    signal::{
        bracketing_pair, sample_times, validate_events, validate_sample_rate, window_samples,
    },
    utils::{self, WindowEdge},
};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2, TAU};

/// How respiratory phase is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum RespiratoryPhaseMethod {
    /// Linear interpolation between detected peaks (phase 0) and troughs (phase π).
    PeakTrough,
    /// Histogram-equalised belt amplitude signed by the breathing direction (Glover 2000).
    Histogram { bins: usize },
}

impl Default for RespiratoryPhaseMethod {
    fn default() -> Self {
        RespiratoryPhaseMethod::PeakTrough
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespiratoryPhaseConfig {
    pub method: RespiratoryPhaseMethod,
}

pub const DEFAULT_HISTOGRAM_BINS: usize = 100;

/// Source of the breathing amplitude in RVT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RvtAmplitude {
    /// Peak-to-trough excursion estimated from the RMS envelope.
    #[default]
    Envelope,
    /// Difference of peak and trough values, each interpolated across samples.
    PeakTrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RvtConfig {
    pub amplitude: RvtAmplitude,
    /// RMS envelope window (seconds) for [`RvtAmplitude::Envelope`].
    pub envelope_window_s: f64,
    /// Delays (seconds) applied to the RVT series, one output column each.
    pub lags_s: Vec<f64>,
}

impl Default for RvtConfig {
    fn default() -> Self {
        Self {
            amplitude: RvtAmplitude::Envelope,
            envelope_window_s: 3.0,
            lags_s: vec![0.0, 4.0, 8.0, 12.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpvConfig {
    pub window_s: f64,
}

impl Default for RpvConfig {
    fn default() -> Self {
        Self { window_s: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub window_s: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self { window_s: 10.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RvConfig {
    pub window_s: f64,
}

impl Default for RvConfig {
    fn default() -> Self {
        Self { window_s: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breath {
    Peak,
    Trough,
}

impl Breath {
    fn phase(self) -> f64 {
        match self {
            Breath::Peak => 0.0,
            Breath::Trough => PI,
        }
    }
}

/// Phase advanced between two consecutive events: half a cycle between a peak
/// and a trough, a whole cycle when a peak or trough is missing in between.
fn phase_span(from: Breath, to: Breath) -> f64 {
    if from == to {
        TAU
    } else {
        PI
    }
}

fn merge_events(peak_times: &[f64], trough_times: &[f64]) -> Result<Vec<(f64, Breath)>> {
    let mut events: Vec<(f64, Breath)> = peak_times
        .iter()
        .map(|&t| (t, Breath::Peak))
        .chain(trough_times.iter().map(|&t| (t, Breath::Trough)))
        .collect();
    events.sort_by(|a, b| a.0.total_cmp(&b.0));
    if let Some(w) = events.windows(2).find(|w| w[1].0 <= w[0].0) {
        return Err(MetricError::invalid(format!(
            "respiratory events must be distinct, two fall at {} s",
            w[0].0
        )));
    }
    if events.len() < 2 {
        return Err(MetricError::insufficient(format!(
            "respiratory phase needs at least 2 peaks/troughs, got {}",
            events.len()
        )));
    }
    Ok(events)
}

/// Respiratory phase at arbitrary `times` from peak and trough times (seconds).
///
/// Peaks sit at phase 0 and troughs at π, so the peak→trough half maps onto
/// `[0, π)` and the trough→peak half onto `[π, 2π)`, each at its own rate.
/// Before the first and after the last event the rate of the nearest
/// half-cycle is held and the phase wrapped.
pub fn respiratory_phase_at(
    peak_times: &[f64],
    trough_times: &[f64],
    times: &[f64],
) -> Result<Vec<f64>> {
    let events = merge_events(peak_times, trough_times)?;
    let last = events.len() - 1;
    Ok(times
        .iter()
        .map(|&t| {
            let k = events.partition_point(|e| e.0 <= t);
            let j = k.clamp(1, last) - 1;
            let (t0, b0) = events[j];
            let (t1, b1) = events[j + 1];
            let rate = phase_span(b0, b1) / (t1 - t0);
            let (anchor_t, anchor_phase) = if k > last {
                (t1, b1.phase())
            } else {
                (t0, b0.phase())
            };
            wrap_phase(anchor_phase + rate * (t - anchor_t))
        })
        .collect())
}

/// Glover's histogram-equalised phase: `π · sign(dR/dt) · CDF(R)`, wrapped into `[0, 2π)`.
pub fn respiratory_phase_histogram(belt: &[f64], bins: usize) -> Result<Vec<f64>> {
    if bins == 0 {
        return Err(MetricError::invalid("histogram needs at least one bin"));
    }
    if belt.len() < 2 {
        return Err(MetricError::insufficient(
            "histogram phase needs at least 2 belt samples",
        ));
    }
    if bins > belt.len() {
        return Err(MetricError::invalid(format!(
            "{bins} histogram bins exceed the {} belt samples",
            belt.len()
        )));
    }
    let (lo, hi) = belt
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !(hi > lo) {
        return Err(MetricError::invalid(
            "belt signal is flat or non-finite; histogram phase is undefined",
        ));
    }
    let bin_of = |v: f64| (((v - lo) / (hi - lo) * bins as f64) as usize).min(bins - 1);
    let mut cumulative = vec![0usize; bins];
    for &v in belt {
        cumulative[bin_of(v)] += 1;
    }
    for b in 1..bins {
        cumulative[b] += cumulative[b - 1];
    }
    let total = belt.len() as f64;
    let n = belt.len();
    Ok((0..n)
        .map(|i| {
            let slope = if i == 0 {
                belt[1] - belt[0]
            } else if i == n - 1 {
                belt[n - 1] - belt[n - 2]
            } else {
                belt[i + 1] - belt[i - 1]
            };
            let sign = if slope < 0.0 { -1.0 } else { 1.0 };
            wrap_phase(PI * sign * cumulative[bin_of(belt[i])] as f64 / total)
        })
        .collect())
}

fn check_belt(belt: &[f64], fs: f64) -> Result<()> {
    validate_sample_rate(fs)?;
    if belt.is_empty() {
        return Err(MetricError::invalid("respiratory waveform has no samples"));
    }
    Ok(())
}

/// Respiratory phase in `[0, 2π)` for every belt sample.
pub fn respiratory_phase(
    belt: &[f64],
    peaks: &[usize],
    troughs: &[usize],
    fs: f64,
    cfg: &RespiratoryPhaseConfig,
) -> Result<Vec<f64>> {
    check_belt(belt, fs)?;
    match cfg.method {
        RespiratoryPhaseMethod::PeakTrough => {
            validate_events(peaks, belt.len(), "respiratory peaks")?;
            validate_events(troughs, belt.len(), "respiratory troughs")?;
            let peak_times: Vec<f64> = peaks.iter().map(|&p| p as f64 / fs).collect();
            let trough_times: Vec<f64> = troughs.iter().map(|&p| p as f64 / fs).collect();
            respiratory_phase_at(&peak_times, &trough_times, &sample_times(belt.len(), fs))
        }
        RespiratoryPhaseMethod::Histogram { bins } => respiratory_phase_histogram(belt, bins),
    }
}

/// Breathing amplitude over breath period at every sample, without lags.
///
/// The period is the distance between the two peaks bracketing the sample; a
/// sample exactly on a peak uses the breath that starts there. Before the
/// first and after the last peak the nearest period (and amplitude) is held.
pub fn rvt_series(
    belt: &[f64],
    peaks: &[usize],
    troughs: &[usize],
    fs: f64,
    cfg: &RvtConfig,
) -> Result<Vec<f64>> {
    check_belt(belt, fs)?;
    validate_events(peaks, belt.len(), "respiratory peaks")?;
    validate_events(troughs, belt.len(), "respiratory troughs")?;
    if peaks.len() < 2 {
        return Err(MetricError::insufficient(format!(
            "RVT needs at least one complete breath (2 peaks), got {} peak(s)",
            peaks.len()
        )));
    }
    let n = belt.len();
    let amplitude = match cfg.amplitude {
        RvtAmplitude::Envelope => {
            let window = window_samples(cfg.envelope_window_s, fs)?;
            let mean = utils::mean(belt);
            let demeaned: Vec<f64> = belt.iter().map(|v| v - mean).collect();
            // peak-to-trough excursion of a sinusoid with this RMS
            utils::rms_envelope(&demeaned, window)?
                .into_iter()
                .map(|r| 2.0 * SQRT_2 * r)
                .collect::<Vec<f64>>()
        }
        RvtAmplitude::PeakTrough => {
            if troughs.is_empty() {
                return Err(MetricError::insufficient(
                    "peak-trough RVT amplitude needs at least one trough",
                ));
            }
            let times = sample_times(n, fs);
            let peak_t: Vec<f64> = peaks.iter().map(|&p| p as f64 / fs).collect();
            let peak_v: Vec<f64> = peaks.iter().map(|&p| belt[p]).collect();
            let trough_t: Vec<f64> = troughs.iter().map(|&p| p as f64 / fs).collect();
            let trough_v: Vec<f64> = troughs.iter().map(|&p| belt[p]).collect();
            let upper = utils::interp_hold(&times, &peak_t, &peak_v);
            let lower = utils::interp_hold(&times, &trough_t, &trough_v);
            upper
                .into_iter()
                .zip(lower)
                .map(|(u, l)| (u - l).max(0.0))
                .collect()
        }
    };
    debug!(
        "RVT over {n} samples from {} peaks and {} troughs",
        peaks.len(),
        troughs.len()
    );
    Ok(amplitude
        .into_iter()
        .enumerate()
        .map(|(i, amp)| {
            let j = bracketing_pair(peaks, i);
            amp / ((peaks[j + 1] - peaks[j]) as f64 / fs)
        })
        .collect())
}

/// Respiratory variance time, one column per lag in `cfg.lags_s` (a single
/// unlagged column when the lag list is empty).
pub fn respiratory_variance_time(
    belt: &[f64],
    peaks: &[usize],
    troughs: &[usize],
    fs: f64,
    cfg: &RvtConfig,
) -> Result<Array2<f64>> {
    let rvt = rvt_series(belt, peaks, troughs, fs, cfg)?;
    let lags = if cfg.lags_s.is_empty() {
        vec![0]
    } else {
        utils::lags_to_samples(&cfg.lags_s, fs)?
    };
    utils::apply_lags(&rvt, &lags)
}

/// Standard deviation of the belt signal in a centered window around every sample.
pub fn respiratory_pattern_variability(belt: &[f64], fs: f64, cfg: &RpvConfig) -> Result<Vec<f64>> {
    check_belt(belt, fs)?;
    let window = window_samples(cfg.window_s, fs)?;
    utils::sliding_window(belt, window, WindowEdge::Mirror, utils::std_dev)
}

/// RMS envelope of the belt signal.
pub fn envelope(belt: &[f64], fs: f64, cfg: &EnvelopeConfig) -> Result<Vec<f64>> {
    check_belt(belt, fs)?;
    let window = window_samples(cfg.window_s, fs)?;
    utils::rms_envelope(belt, window)
}

/// Respiratory variance (Chang & Glover 2009): sample standard deviation of the
/// belt in a centered window, shrinking at the recording edges.
pub fn respiratory_variance(belt: &[f64], fs: f64, cfg: &RvConfig) -> Result<Vec<f64>> {
    check_belt(belt, fs)?;
    let window = window_samples(cfg.window_s, fs)?;
    utils::sliding_window(belt, window, WindowEdge::Truncate, |w| {
        if w.len() < 2 {
            0.0
        } else {
            utils::sample_std_dev(w)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::assert_close;

    fn breathing(n: usize, fs: f64, period_s: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (TAU * i as f64 / fs / period_s).cos())
            .collect()
    }

    #[test]
    fn trough_sits_at_pi() {
        let belt = vec![0.0; 600];
        let phase = respiratory_phase(
            &belt,
            &[100, 500],
            &[300],
            50.0,
            &RespiratoryPhaseConfig::default(),
        )
        .unwrap();
        assert_close(phase[300], PI, 1e-12);
        assert_eq!(phase[100], 0.0);
        assert_eq!(phase[500], 0.0);
    }

    #[test]
    fn halves_are_asymmetric() {
        // peak→trough lasts 100 samples, trough→peak 300
        let belt = vec![0.0; 600];
        let phase = respiratory_phase(
            &belt,
            &[100, 500],
            &[200],
            50.0,
            &RespiratoryPhaseConfig::default(),
        )
        .unwrap();
        assert_close(phase[150], PI / 2.0, 1e-12);
        assert_close(phase[350], 1.5 * PI, 1e-12);
        for v in &phase[100..200] {
            assert!((0.0..PI).contains(v));
        }
        for v in &phase[200..500] {
            assert!((PI..TAU).contains(v));
        }
    }

    #[test]
    fn edges_hold_nearest_half_cycle_rate() {
        let belt = vec![0.0; 600];
        let phase = respiratory_phase(
            &belt,
            &[100, 500],
            &[200],
            50.0,
            &RespiratoryPhaseConfig::default(),
        )
        .unwrap();
        // before the first peak: rate of the peak→trough half (π per 100 samples)
        assert_close(phase[50], TAU - PI / 2.0, 1e-12);
        // after the last peak: rate of the trough→peak half (π per 300 samples)
        assert_close(phase[560], PI * 60.0 / 300.0, 1e-12);
        assert!(phase.iter().all(|v| (0.0..TAU).contains(v)));
    }

    #[test]
    fn tolerates_missing_trough() {
        let belt = vec![0.0; 800];
        let phase = respiratory_phase(
            &belt,
            &[100, 300, 500],
            &[400],
            50.0,
            &RespiratoryPhaseConfig::default(),
        )
        .unwrap();
        // peak→peak with no trough in between counts as a full cycle
        assert_close(phase[200], PI, 1e-12);
        assert_close(phase[400], PI, 1e-12);
    }

    #[test]
    fn phase_needs_two_events() {
        let err = respiratory_phase(&[0.0; 10], &[3], &[], 10.0, &RespiratoryPhaseConfig::default())
            .unwrap_err();
        assert!(matches!(err, MetricError::DataInsufficient(_)));
        let err = respiratory_phase(&[0.0; 10], &[3], &[3], 10.0, &RespiratoryPhaseConfig::default())
            .unwrap_err();
        assert!(matches!(err, MetricError::InvalidArgument(_)));
    }

    #[test]
    fn histogram_phase_is_wrapped_and_signed() {
        let belt = breathing(1000, 25.0, 4.0);
        let cfg = RespiratoryPhaseConfig {
            method: RespiratoryPhaseMethod::Histogram {
                bins: DEFAULT_HISTOGRAM_BINS,
            },
        };
        let phase = respiratory_phase(&belt, &[], &[], 25.0, &cfg).unwrap();
        assert_eq!(phase.len(), 1000);
        assert!(phase.iter().all(|v| (0.0..TAU).contains(v)));
        // falling belt (first quarter of the cosine) maps to the upper half-circle
        assert!(phase[10] > PI);
        // rising belt maps to the lower half-circle
        assert!(phase[75] < PI);
        assert!(respiratory_phase_histogram(&[1.0; 10], 10).is_err());
        assert!(matches!(
            respiratory_phase_histogram(&belt, usize::MAX),
            Err(MetricError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rvt_is_non_negative() {
        let fs = 25.0;
        let belt = breathing(1500, fs, 4.0);
        let peaks: Vec<usize> = (0..15).map(|k| k * 100).collect();
        let troughs: Vec<usize> = (0..15).map(|k| k * 100 + 50).collect();
        for amplitude in [RvtAmplitude::Envelope, RvtAmplitude::PeakTrough] {
            let cfg = RvtConfig {
                amplitude,
                ..RvtConfig::default()
            };
            let rvt = respiratory_variance_time(&belt, &peaks, &troughs, fs, &cfg).unwrap();
            assert_eq!(rvt.dim(), (1500, 4));
            assert!(rvt.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn rvt_peak_trough_matches_amplitude_over_period() {
        let fs = 25.0;
        let belt = breathing(1500, fs, 4.0);
        let peaks: Vec<usize> = (0..15).map(|k| k * 100).collect();
        let troughs: Vec<usize> = (0..15).map(|k| k * 100 + 50).collect();
        let cfg = RvtConfig {
            amplitude: RvtAmplitude::PeakTrough,
            lags_s: vec![],
            ..RvtConfig::default()
        };
        let rvt = respiratory_variance_time(&belt, &peaks, &troughs, fs, &cfg).unwrap();
        assert_eq!(rvt.dim(), (1500, 1));
        // amplitude 2 (cos from 1 to -1) over a 4 s period
        assert_close(rvt[[700, 0]], 0.5, 1e-9);
    }

    #[test]
    fn rvt_envelope_tracks_sinusoid() {
        let fs = 25.0;
        let belt = breathing(1500, fs, 4.0);
        let peaks: Vec<usize> = (0..15).map(|k| k * 100).collect();
        let cfg = RvtConfig {
            envelope_window_s: 4.0,
            lags_s: vec![],
            ..RvtConfig::default()
        };
        let rvt = rvt_series(&belt, &peaks, &[], fs, &cfg).unwrap();
        assert_close(rvt[700], 0.5, 1e-2);
    }

    #[test]
    fn rvt_tie_break_uses_following_breath() {
        let fs = 100.0;
        let cfg = RvtConfig {
            amplitude: RvtAmplitude::PeakTrough,
            lags_s: vec![],
            ..RvtConfig::default()
        };
        // breaths of 1 s then 2 s; troughs at -1 so the amplitude is constant
        let mut belt = vec![1.0; 400];
        belt[50] = -1.0;
        belt[200] = -1.0;
        let rvt = rvt_series(&belt, &[0, 100, 300], &[50, 200], fs, &cfg).unwrap();
        assert_close(rvt[99], 2.0, 1e-12);
        assert_close(rvt[100], 1.0, 1e-12);
        // past the last peak the last period is held
        assert_close(rvt[399], 1.0, 1e-12);
    }

    #[test]
    fn rvt_lags_delay_with_edge_hold() {
        let fs = 10.0;
        let belt = breathing(400, fs, 4.0);
        let peaks: Vec<usize> = (0..10).map(|k| k * 40).collect();
        let troughs: Vec<usize> = (0..10).map(|k| k * 40 + 20).collect();
        let cfg = RvtConfig {
            amplitude: RvtAmplitude::PeakTrough,
            lags_s: vec![0.0, 2.0],
            ..RvtConfig::default()
        };
        let rvt = respiratory_variance_time(&belt, &peaks, &troughs, fs, &cfg).unwrap();
        assert_eq!(rvt[[100, 1]], rvt[[80, 0]]);
        assert_eq!(rvt[[5, 1]], rvt[[0, 0]]);
    }

    #[test]
    fn rvt_needs_a_breath() {
        let err = rvt_series(&[0.0; 100], &[10], &[50], 10.0, &RvtConfig::default()).unwrap_err();
        assert!(matches!(err, MetricError::DataInsufficient(_)));
    }

    #[test]
    fn rpv_is_windowed_std() {
        let belt: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let rpv = respiratory_pattern_variability(&belt, 10.0, &RpvConfig { window_s: 2.0 }).unwrap();
        assert_eq!(rpv.len(), 200);
        // 21-sample window of alternating ±1 has std sqrt(1 - (1/21)^2)
        assert_close(rpv[100], (1.0 - 1.0 / 441.0_f64).sqrt(), 1e-12);
    }

    #[test]
    fn envelope_of_sinusoid() {
        let belt = breathing(1000, 25.0, 4.0);
        let env = envelope(&belt, 25.0, &EnvelopeConfig { window_s: 4.0 }).unwrap();
        assert_eq!(env.len(), 1000);
        assert_close(env[500], 1.0 / SQRT_2, 1e-2);
    }

    #[test]
    fn respiratory_variance_shrinks_at_edges() {
        let belt = breathing(500, 25.0, 4.0);
        let rv = respiratory_variance(&belt, 25.0, &RvConfig::default()).unwrap();
        assert_eq!(rv.len(), 500);
        assert!(rv.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
}
