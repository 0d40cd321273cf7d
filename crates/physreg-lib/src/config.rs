//! Every tunable option of the metric engine, with defaults, loadable from TOML.

use crate::{
    metrics::{
        cardiac::{HbiConfig, HeartRateConfig, HrvConfig},
        respiratory::{
            EnvelopeConfig, RespiratoryPhaseConfig, RpvConfig, RvConfig, RvtConfig,
        },
        retroicor::RetroicorConfig,
    },
    responses::ResponseKernel,
    utils::{ConvolutionMode, Rescale},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Convolution of a metric with a response kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionConfig {
    pub enabled: bool,
    pub mode: ConvolutionMode,
    pub rescale: Rescale,
    /// Kernel override; each metric has its own default.
    pub kernel: Option<ResponseKernel>,
    /// Kernel duration in seconds; defaults to the kernel's canonical length.
    pub time_length_s: Option<f64>,
    pub onset_s: f64,
    /// Value substituted for undefined (NaN) samples before convolving.
    pub undefined_fill: Option<f64>,
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ConvolutionMode::Same,
            rescale: Rescale::Rescale,
            kernel: None,
            time_length_s: None,
            onset_s: 0.0,
            undefined_fill: None,
        }
    }
}

/// Delays (seconds) applied to single-series metrics. RVT carries its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    pub lags_s: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Repetition time of the imaging acquisition, seconds.
    pub tr: Option<f64>,
    /// Number of imaging timepoints to keep.
    pub ntp: Option<usize>,
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tr: None,
            ntp: None,
            extension: ".1D".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysregConfig {
    pub heart_rate: HeartRateConfig,
    pub heart_rate_variability: HrvConfig,
    pub heart_beat_interval: HbiConfig,
    pub respiratory_phase: RespiratoryPhaseConfig,
    pub respiratory_variance_time: RvtConfig,
    pub respiratory_pattern_variability: RpvConfig,
    pub envelope: EnvelopeConfig,
    pub respiratory_variance: RvConfig,
    pub retroicor: RetroicorConfig,
    pub convolution: ConvolutionConfig,
    pub lags: LagConfig,
    pub export: ExportConfig,
}

impl PhysregConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing physreg config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing physreg config")
    }
}
