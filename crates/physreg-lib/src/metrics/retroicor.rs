//! RETROICOR phase regressors (Glover, Li & Ress 2000).
//!
//! Column layout is positional: the cardiac block comes first, then the
//! respiratory block. Within a block, column `2k` is `cos((k + 1)·φ)` and
//! column `2k + 1` is `sin((k + 1)·φ)`.

use crate::{
    error::{MetricError, Result},
    metrics::{
        cardiac::{cardiac_phase, cardiac_phase_at},
        respiratory::{
            respiratory_phase, respiratory_phase_at, RespiratoryPhaseConfig,
            RespiratoryPhaseMethod,
        },
    },
    signal::{validate_events, validate_sample_rate},
};
use log::debug;
use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetroicorConfig {
    /// Fourier order of the cardiac block.
    pub cardiac_harmonics: usize,
    /// Fourier order of the respiratory block.
    pub respiratory_harmonics: usize,
    pub respiratory_phase: RespiratoryPhaseConfig,
}

impl Default for RetroicorConfig {
    fn default() -> Self {
        Self {
            cardiac_harmonics: 3,
            respiratory_harmonics: 2,
            respiratory_phase: RespiratoryPhaseConfig::default(),
        }
    }
}

/// Breathing-belt recording with its detected peaks and troughs.
#[derive(Debug, Clone, Copy)]
pub struct BreathingInput<'a> {
    pub belt: &'a [f64],
    pub peaks: &'a [usize],
    pub troughs: &'a [usize],
}

/// Scan timing of a slice-wise acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceAcquisition {
    /// Repetition time in seconds.
    pub t_r: f64,
    pub n_scans: usize,
    /// Acquisition offset of every slice within a volume, in seconds.
    pub slice_timings: Vec<f64>,
}

impl SliceAcquisition {
    fn validate(&self) -> Result<()> {
        if !(self.t_r.is_finite() && self.t_r > 0.0) {
            return Err(MetricError::invalid(format!("TR must be positive, got {}", self.t_r)));
        }
        if self.n_scans == 0 {
            return Err(MetricError::invalid("acquisition has no scans"));
        }
        if self.slice_timings.is_empty() {
            return Err(MetricError::invalid("acquisition has no slices"));
        }
        if let Some(t) = self.slice_timings.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(MetricError::invalid(format!("invalid slice timing {t}")));
        }
        Ok(())
    }

    /// Acquisition time of `slice` in every scan: `t_r · scan + slice_timing`.
    pub fn slice_times(&self, slice: usize) -> Vec<f64> {
        let offset = self.slice_timings[slice];
        (0..self.n_scans)
            .map(|scan| self.t_r * scan as f64 + offset)
            .collect()
    }
}

/// Expand a phase series into `order` cos/sin harmonic pairs.
pub fn fourier_expansion(phase: &[f64], order: usize) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((phase.len(), 2 * order));
    for k in 0..order {
        let h = (k + 1) as f64;
        for (i, &p) in phase.iter().enumerate() {
            out[[i, 2 * k]] = (h * p).cos();
            out[[i, 2 * k + 1]] = (h * p).sin();
        }
    }
    out
}

fn check_orders(cardiac: bool, respiratory: bool, cfg: &RetroicorConfig) -> Result<()> {
    if !cardiac && !respiratory {
        return Err(MetricError::invalid(
            "RETROICOR needs cardiac peaks, respiratory events, or both",
        ));
    }
    if cardiac && cfg.cardiac_harmonics == 0 {
        return Err(MetricError::invalid("cardiac harmonic order must be at least 1"));
    }
    if respiratory && cfg.respiratory_harmonics == 0 {
        return Err(MetricError::invalid(
            "respiratory harmonic order must be at least 1",
        ));
    }
    Ok(())
}

fn stack(blocks: Vec<Array2<f64>>) -> Result<Array2<f64>> {
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    concatenate(Axis(1), &views).map_err(|e| MetricError::invalid(e.to_string()))
}

/// Sample-wise RETROICOR regressors for a recording of `n_samples` at `fs`.
///
/// Returns `(n_samples, 2·M_c + 2·M_r)` columns for the modalities supplied.
/// A failing phase computation fails the whole call.
pub fn retroicor(
    n_samples: usize,
    fs: f64,
    cardiac_peaks: Option<&[usize]>,
    respiratory: Option<BreathingInput<'_>>,
    cfg: &RetroicorConfig,
) -> Result<Array2<f64>> {
    check_orders(cardiac_peaks.is_some(), respiratory.is_some(), cfg)?;
    let mut blocks = Vec::with_capacity(2);
    if let Some(peaks) = cardiac_peaks {
        let phase = cardiac_phase(n_samples, peaks, fs)?;
        blocks.push(fourier_expansion(&phase, cfg.cardiac_harmonics));
    }
    if let Some(resp) = respiratory {
        if resp.belt.len() != n_samples {
            return Err(MetricError::invalid(format!(
                "respiratory waveform has {} samples, expected {n_samples}",
                resp.belt.len()
            )));
        }
        let phase = respiratory_phase(
            resp.belt,
            resp.peaks,
            resp.troughs,
            fs,
            &cfg.respiratory_phase,
        )?;
        blocks.push(fourier_expansion(&phase, cfg.respiratory_harmonics));
    }
    let out = stack(blocks)?;
    debug!("RETROICOR matrix {:?}", out.dim());
    Ok(out)
}

fn index_times(indices: &[usize], fs: f64) -> Vec<f64> {
    indices.iter().map(|&i| i as f64 / fs).collect()
}

/// RETROICOR regressors evaluated at slice acquisition times, one
/// `(n_scans, 2·M_c + 2·M_r)` matrix per slice.
///
/// Peak and trough indices refer to recordings at `fs` that start with the
/// first scan. With the histogram respiratory method the phase of the belt
/// sample nearest each acquisition time is used.
pub fn retroicor_slices(
    fs: f64,
    cardiac_peaks: Option<&[usize]>,
    respiratory: Option<BreathingInput<'_>>,
    acquisition: &SliceAcquisition,
    cfg: &RetroicorConfig,
) -> Result<Vec<Array2<f64>>> {
    validate_sample_rate(fs)?;
    acquisition.validate()?;
    check_orders(cardiac_peaks.is_some(), respiratory.is_some(), cfg)?;

    let cardiac_times = match cardiac_peaks {
        Some(peaks) => {
            validate_events(peaks, usize::MAX, "cardiac peaks")?;
            Some(index_times(peaks, fs))
        }
        None => None,
    };
    // the histogram phase only exists on the belt's own samples
    let sampled_resp_phase = match respiratory {
        Some(resp) => match cfg.respiratory_phase.method {
            RespiratoryPhaseMethod::Histogram { .. } => Some(respiratory_phase(
                resp.belt,
                resp.peaks,
                resp.troughs,
                fs,
                &cfg.respiratory_phase,
            )?),
            RespiratoryPhaseMethod::PeakTrough => {
                validate_events(resp.peaks, usize::MAX, "respiratory peaks")?;
                validate_events(resp.troughs, usize::MAX, "respiratory troughs")?;
                None
            }
        },
        None => None,
    };

    (0..acquisition.slice_timings.len())
        .map(|slice| {
            let times = acquisition.slice_times(slice);
            let mut blocks = Vec::with_capacity(2);
            if let Some(peak_times) = &cardiac_times {
                let phase = cardiac_phase_at(peak_times, &times)?;
                blocks.push(fourier_expansion(&phase, cfg.cardiac_harmonics));
            }
            if let Some(resp) = respiratory {
                let phase = match &sampled_resp_phase {
                    Some(sampled) => {
                        let last = sampled.len() - 1;
                        times
                            .iter()
                            .map(|t| sampled[((t * fs).round() as usize).min(last)])
                            .collect()
                    }
                    None => respiratory_phase_at(
                        &index_times(resp.peaks, fs),
                        &index_times(resp.troughs, fs),
                        &times,
                    )?,
                };
                blocks.push(fourier_expansion(&phase, cfg.respiratory_harmonics));
            }
            stack(blocks)
        })
        .collect()
}
