//! One entry point for every metric: compute, lag, convolve, and record the call.

use crate::{
    config::PhysregConfig,
    error::{MetricError, Result},
    metrics::{
        cardiac, respiratory,
        retroicor::{self, BreathingInput},
    },
    responses::ResponseKernel,
    signal::{Events, Waveform},
    utils,
};
use log::{debug, info, warn};
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    CardiacPhase,
    HeartRate,
    HeartRateVariability,
    HeartBeatInterval,
    RespiratoryPhase,
    RespiratoryVarianceTime,
    RespiratoryPatternVariability,
    Envelope,
    RespiratoryVariance,
    Retroicor,
}

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        MetricKind::CardiacPhase,
        MetricKind::HeartRate,
        MetricKind::HeartRateVariability,
        MetricKind::HeartBeatInterval,
        MetricKind::RespiratoryPhase,
        MetricKind::RespiratoryVarianceTime,
        MetricKind::RespiratoryPatternVariability,
        MetricKind::Envelope,
        MetricKind::RespiratoryVariance,
        MetricKind::Retroicor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::CardiacPhase => "cardiac-phase",
            MetricKind::HeartRate => "heart-rate",
            MetricKind::HeartRateVariability => "heart-rate-variability",
            MetricKind::HeartBeatInterval => "heart-beat-interval",
            MetricKind::RespiratoryPhase => "respiratory-phase",
            MetricKind::RespiratoryVarianceTime => "respiratory-variance-time",
            MetricKind::RespiratoryPatternVariability => "respiratory-pattern-variability",
            MetricKind::Envelope => "envelope",
            MetricKind::RespiratoryVariance => "respiratory-variance",
            MetricKind::Retroicor => "retroicor",
        }
    }

    /// Kernel a metric is convolved with unless overridden. Phase regressors have none.
    pub fn default_kernel(&self) -> Option<ResponseKernel> {
        match self {
            MetricKind::HeartRate | MetricKind::HeartRateVariability => Some(ResponseKernel::Crf),
            MetricKind::HeartBeatInterval => Some(ResponseKernel::Icrf),
            MetricKind::RespiratoryVarianceTime
            | MetricKind::RespiratoryPatternVariability
            | MetricKind::Envelope
            | MetricKind::RespiratoryVariance => Some(ResponseKernel::Rrf),
            MetricKind::CardiacPhase | MetricKind::RespiratoryPhase | MetricKind::Retroicor => {
                None
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = MetricKind::ALL.iter().map(|k| k.name()).collect();
                MetricError::invalid(format!(
                    "unknown metric '{s}', expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// A physiological recording with the events detected on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub waveform: Waveform,
    pub peaks: Events,
    #[serde(default)]
    pub troughs: Events,
}

impl Recording {
    pub fn new(waveform: Waveform, peaks: Events, troughs: Events) -> Self {
        Self {
            waveform,
            peaks,
            troughs,
        }
    }

    fn breathing(&self) -> BreathingInput<'_> {
        BreathingInput {
            belt: &self.waveform.data,
            peaks: &self.peaks.indices,
            troughs: &self.troughs.indices,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhysioInputs {
    pub cardiac: Option<Recording>,
    pub respiratory: Option<Recording>,
}

impl PhysioInputs {
    fn cardiac(&self, kind: MetricKind) -> Result<&Recording> {
        self.cardiac.as_ref().ok_or_else(|| {
            MetricError::invalid(format!("{kind} needs a cardiac recording with peaks"))
        })
    }

    fn respiratory(&self, kind: MetricKind) -> Result<&Recording> {
        self.respiratory.as_ref().ok_or_else(|| {
            MetricError::invalid(format!("{kind} needs a respiratory recording"))
        })
    }
}

/// Provenance record of a metric invocation: the metric and every parameter it used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCall {
    pub metric: MetricKind,
    pub params: BTreeMap<String, Value>,
}

impl MetricCall {
    pub fn new(metric: MetricKind) -> Self {
        Self {
            metric,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Result<Self> {
        self.params.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Record every field of a config section as its own parameter.
    pub fn with_section(mut self, section: impl Serialize) -> Result<Self> {
        match serde_json::to_value(section)? {
            Value::Object(fields) => self.params.extend(fields),
            other => {
                self.params.insert("config".to_string(), other);
            }
        }
        Ok(self)
    }

    pub fn log(&self) {
        let mut msg = format!(
            "The {} regressor will be computed using the following parameters:",
            self.metric
        );
        for (key, value) in &self.params {
            msg.push_str(&format!("\n    {key} = {value}"));
        }
        info!("{msg}");
    }
}

/// Metric output at the native sample rate, one labelled column per regressor.
#[derive(Debug, Clone)]
pub struct Regressor {
    pub call: MetricCall,
    pub fs: f64,
    /// Column labels; a single unlabelled column is written without suffix.
    pub labels: Vec<String>,
    pub data: Array2<f64>,
}

impl Regressor {
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let j = self.labels.iter().position(|l| l == label)?;
        Some(self.data.column(j).to_vec())
    }
}

/// Metric output before the lag and convolution stages.
enum Base {
    /// One series, eligible for the generic lag stage.
    Series(Vec<f64>),
    /// Columns the metric labelled itself (RVT lags, RETROICOR harmonics).
    Labelled(Vec<String>, Array2<f64>),
}

fn lag_labels(lags_s: &[f64]) -> Vec<String> {
    lags_s.iter().map(|lag| format!("lag-{lag}")).collect()
}

fn join_label(prefix: &str, label: &str) -> String {
    if label.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}_{label}")
    }
}

fn retroicor_labels(
    cardiac: bool,
    respiratory: bool,
    cfg: &retroicor::RetroicorConfig,
) -> Vec<String> {
    let mut labels = Vec::new();
    let mut block = |name: &str, order: usize| {
        for k in 1..=order {
            labels.push(format!("{name}-cos-{k}"));
            labels.push(format!("{name}-sin-{k}"));
        }
    };
    if cardiac {
        block("cardiac", cfg.cardiac_harmonics);
    }
    if respiratory {
        block("respiratory", cfg.respiratory_harmonics);
    }
    labels
}

/// Compute `kind` from `inputs`, then apply the lag and convolution stages of `cfg`.
pub fn compute_metric(
    kind: MetricKind,
    inputs: &PhysioInputs,
    cfg: &PhysregConfig,
) -> Result<Regressor> {
    let mut call = MetricCall::new(kind);
    let (fs, base) = match kind {
        MetricKind::CardiacPhase => {
            let rec = inputs.cardiac(kind)?;
            let fs = rec.waveform.fs;
            (
                fs,
                Base::Series(cardiac::cardiac_phase(rec.waveform.len(), &rec.peaks.indices, fs)?),
            )
        }
        MetricKind::HeartRate => {
            let rec = inputs.cardiac(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.heart_rate)?;
            (
                fs,
                Base::Series(cardiac::heart_rate(
                    rec.waveform.len(),
                    &rec.peaks.indices,
                    fs,
                    &cfg.heart_rate,
                )?),
            )
        }
        MetricKind::HeartRateVariability => {
            let rec = inputs.cardiac(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.heart_rate_variability)?;
            (
                fs,
                Base::Series(cardiac::heart_rate_variability(
                    rec.waveform.len(),
                    &rec.peaks.indices,
                    fs,
                    &cfg.heart_rate_variability,
                )?),
            )
        }
        MetricKind::HeartBeatInterval => {
            let rec = inputs.cardiac(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.heart_beat_interval)?;
            (
                fs,
                Base::Series(cardiac::heart_beat_interval_series(
                    rec.waveform.len(),
                    &rec.peaks.indices,
                    fs,
                    &cfg.heart_beat_interval,
                )?),
            )
        }
        MetricKind::RespiratoryPhase => {
            let rec = inputs.respiratory(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.respiratory_phase)?;
            (
                fs,
                Base::Series(respiratory::respiratory_phase(
                    &rec.waveform.data,
                    &rec.peaks.indices,
                    &rec.troughs.indices,
                    fs,
                    &cfg.respiratory_phase,
                )?),
            )
        }
        MetricKind::RespiratoryVarianceTime => {
            let rec = inputs.respiratory(kind)?;
            let fs = rec.waveform.fs;
            let rvt_cfg = &cfg.respiratory_variance_time;
            call = call.with_section(rvt_cfg)?;
            let data = respiratory::respiratory_variance_time(
                &rec.waveform.data,
                &rec.peaks.indices,
                &rec.troughs.indices,
                fs,
                rvt_cfg,
            )?;
            let labels = if rvt_cfg.lags_s.is_empty() {
                vec![String::new()]
            } else {
                lag_labels(&rvt_cfg.lags_s)
            };
            (fs, Base::Labelled(labels, data))
        }
        MetricKind::RespiratoryPatternVariability => {
            let rec = inputs.respiratory(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.respiratory_pattern_variability)?;
            (
                fs,
                Base::Series(respiratory::respiratory_pattern_variability(
                    &rec.waveform.data,
                    fs,
                    &cfg.respiratory_pattern_variability,
                )?),
            )
        }
        MetricKind::Envelope => {
            let rec = inputs.respiratory(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.envelope)?;
            (
                fs,
                Base::Series(respiratory::envelope(&rec.waveform.data, fs, &cfg.envelope)?),
            )
        }
        MetricKind::RespiratoryVariance => {
            let rec = inputs.respiratory(kind)?;
            let fs = rec.waveform.fs;
            call = call.with_section(cfg.respiratory_variance)?;
            (
                fs,
                Base::Series(respiratory::respiratory_variance(
                    &rec.waveform.data,
                    fs,
                    &cfg.respiratory_variance,
                )?),
            )
        }
        MetricKind::Retroicor => {
            let (n_samples, fs) = match (&inputs.cardiac, &inputs.respiratory) {
                (Some(c), Some(r)) => {
                    if c.waveform.len() != r.waveform.len() || c.waveform.fs != r.waveform.fs {
                        return Err(MetricError::invalid(
                            "cardiac and respiratory recordings must share length and sample rate",
                        ));
                    }
                    (c.waveform.len(), c.waveform.fs)
                }
                (Some(c), None) => (c.waveform.len(), c.waveform.fs),
                (None, Some(r)) => (r.waveform.len(), r.waveform.fs),
                (None, None) => {
                    return Err(MetricError::invalid(
                        "retroicor needs a cardiac recording, a respiratory recording, or both",
                    ))
                }
            };
            call = call.with_section(cfg.retroicor)?;
            let data = retroicor::retroicor(
                n_samples,
                fs,
                inputs.cardiac.as_ref().map(|c| c.peaks.indices.as_slice()),
                inputs.respiratory.as_ref().map(Recording::breathing),
                &cfg.retroicor,
            )?;
            let labels = retroicor_labels(
                inputs.cardiac.is_some(),
                inputs.respiratory.is_some(),
                &cfg.retroicor,
            );
            (fs, Base::Labelled(labels, data))
        }
    };

    let (labels, data) = match base {
        Base::Series(series) if !cfg.lags.lags_s.is_empty() => {
            let lags = utils::lags_to_samples(&cfg.lags.lags_s, fs)?;
            call = call.with("lags_s", &cfg.lags.lags_s)?;
            (lag_labels(&cfg.lags.lags_s), utils::apply_lags(&series, &lags)?)
        }
        Base::Series(series) => (
            vec![String::new()],
            Array1::from(series).insert_axis(Axis(1)),
        ),
        Base::Labelled(labels, data) => {
            if !cfg.lags.lags_s.is_empty() {
                warn!(
                    "{kind} builds its own columns; ignoring [lags] lags_s = {:?}",
                    cfg.lags.lags_s
                );
            }
            (labels, data)
        }
    };

    call = call.with("fs", fs)?;
    let (labels, data, call) = if cfg.convolution.enabled {
        convolve_stage(kind, fs, labels, data, cfg, call)?
    } else {
        (labels, data, call)
    };
    call.log();
    debug!("{kind} regressor: {:?} with columns {:?}", data.dim(), labels);
    Ok(Regressor {
        call,
        fs,
        labels,
        data,
    })
}

fn convolve_stage(
    kind: MetricKind,
    fs: f64,
    labels: Vec<String>,
    mut data: Array2<f64>,
    cfg: &PhysregConfig,
    call: MetricCall,
) -> Result<(Vec<String>, Array2<f64>, MetricCall)> {
    let conv = &cfg.convolution;
    let kernel_kind = match (kind.default_kernel(), conv.kernel) {
        (None, _) => {
            return Err(MetricError::invalid(format!(
                "{kind} is a phase regressor and cannot be convolved"
            )))
        }
        (Some(_), Some(custom)) => custom,
        (Some(default), None) => default,
    };
    let time_length = conv
        .time_length_s
        .unwrap_or_else(|| kernel_kind.default_time_length());
    let kernel = kernel_kind.build(fs, time_length, conv.onset_s)?;

    if let Some(fill) = conv.undefined_fill {
        data.mapv_inplace(|v| if v.is_nan() { fill } else { v });
    }
    let (raw, convolved) = utils::convolve_columns(&data, &kernel, conv.mode, conv.rescale)?;
    let combined = concatenate(Axis(1), &[raw.view(), convolved.view()])
        .map_err(|e| MetricError::invalid(e.to_string()))?;

    let mut out_labels: Vec<String> = labels.iter().map(|l| join_label("raw", l)).collect();
    out_labels.extend(labels.iter().map(|l| join_label("convolved", l)));

    let call = call
        .with("kernel", kernel_kind)?
        .with("kernel_time_length_s", time_length)?
        .with("kernel_onset_s", conv.onset_s)?
        .with("convolution_mode", conv.mode)?
        .with("rescale", conv.rescale)?;
    Ok((out_labels, combined, call))
}
