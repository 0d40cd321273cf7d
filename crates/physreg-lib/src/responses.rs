//! Closed-form physiological response kernels.
//!
//! Every kernel is sampled on `t = 0, 1/fs, ..., < time_length`, shifted right by
//! `onset` (zero before it) and normalised to unit peak magnitude.

use crate::error::{MetricError, Result};
use crate::signal::validate_sample_rate;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const CRF_TIME_LENGTH_S: f64 = 32.0;
pub const RRF_TIME_LENGTH_S: f64 = 50.0;

/// Which kernel a metric is convolved with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum ResponseKernel {
    Crf,
    Icrf,
    Rrf,
    Irf { peak: f64, dispersion: f64 },
}

impl ResponseKernel {
    pub fn default_time_length(&self) -> f64 {
        match self {
            ResponseKernel::Crf | ResponseKernel::Icrf | ResponseKernel::Irf { .. } => {
                CRF_TIME_LENGTH_S
            }
            ResponseKernel::Rrf => RRF_TIME_LENGTH_S,
        }
    }

    pub fn build(&self, fs: f64, time_length: f64, onset: f64) -> Result<Vec<f64>> {
        match *self {
            ResponseKernel::Crf => crf(fs, time_length, onset),
            ResponseKernel::Icrf => icrf(fs, time_length, onset),
            ResponseKernel::Rrf => rrf(fs, time_length, onset),
            ResponseKernel::Irf { peak, dispersion } => irf(fs, time_length, peak, dispersion),
        }
    }
}

fn time_stamps(fs: f64, time_length: f64, onset: f64) -> Result<Vec<f64>> {
    validate_sample_rate(fs)?;
    if !(time_length.is_finite() && time_length > 0.0) {
        return Err(MetricError::invalid(format!(
            "kernel length must be positive, got {time_length} s"
        )));
    }
    if !onset.is_finite() || onset < 0.0 {
        return Err(MetricError::invalid(format!(
            "kernel onset must be non-negative, got {onset} s"
        )));
    }
    let n = (time_length * fs).ceil() as usize;
    Ok((0..n).map(|i| i as f64 / fs - onset).collect())
}

fn normalise(mut kernel: Vec<f64>) -> Result<Vec<f64>> {
    let peak = kernel.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if peak == 0.0 || !peak.is_finite() {
        return Err(MetricError::invalid(
            "kernel is identically zero over the requested span",
        ));
    }
    kernel.iter_mut().for_each(|v| *v /= peak);
    Ok(kernel)
}

/// Cardiac response function (Chang, Cunningham & Glover 2009, appendix A).
pub fn crf(fs: f64, time_length: f64, onset: f64) -> Result<Vec<f64>> {
    let gauss = 16.0 / (2.0 * PI * 9.0).sqrt();
    let kernel = time_stamps(fs, time_length, onset)?
        .into_iter()
        .map(|t| {
            if t < 0.0 {
                0.0
            } else {
                0.6 * t.powf(2.7) * (-t / 1.6).exp()
                    - gauss * (-0.5 * (t - 12.0).powi(2) / 9.0).exp()
            }
        })
        .collect();
    normalise(kernel)
}

/// Additive inverse of [`crf`], used for heart-beat interval regressors.
pub fn icrf(fs: f64, time_length: f64, onset: f64) -> Result<Vec<f64>> {
    Ok(crf(fs, time_length, onset)?.into_iter().map(|v| -v).collect())
}

/// Respiratory response function (Chang & Glover 2009, appendix A).
pub fn rrf(fs: f64, time_length: f64, onset: f64) -> Result<Vec<f64>> {
    let kernel = time_stamps(fs, time_length, onset)?
        .into_iter()
        .map(|t| {
            if t < 0.0 {
                0.0
            } else {
                0.6 * t.powf(2.1) * (-t / 1.6).exp() - 0.0023 * t.powf(3.54) * (-t / 4.25).exp()
            }
        })
        .collect();
    normalise(kernel)
}

/// Gamma-shaped impulse response peaking at `peak` seconds with width set by `dispersion`.
///
/// `h(t) = (t / peak)^(peak / dispersion) * exp(-(t - peak) / dispersion)`, which is
/// exactly 1 at `t = peak`.
pub fn irf(fs: f64, time_length: f64, peak: f64, dispersion: f64) -> Result<Vec<f64>> {
    if !(peak.is_finite() && peak > 0.0 && dispersion.is_finite() && dispersion > 0.0) {
        return Err(MetricError::invalid(format!(
            "impulse response needs positive peak and dispersion, got {peak} and {dispersion}"
        )));
    }
    let shape = peak / dispersion;
    let kernel = time_stamps(fs, time_length, 0.0)?
        .into_iter()
        .map(|t| (t / peak).powf(shape) * (-(t - peak) / dispersion).exp())
        .collect();
    normalise(kernel)
}
