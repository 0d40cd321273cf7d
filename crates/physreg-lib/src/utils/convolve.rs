use crate::error::{MetricError, Result};
use log::debug;
use ndarray::{Array1, Array2};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Below this kernel or signal length a direct convolution is cheaper than an FFT.
const DIRECT_CONVOLUTION_MAX: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvolutionMode {
    /// Complete convolution, `len + kernel_len - 1` samples.
    Full,
    /// Causal convolution truncated to the input length.
    #[default]
    Same,
}

/// Scaling applied to the raw and convolved columns after convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rescale {
    /// Min-max map the convolved column onto the range of the raw metric.
    #[default]
    Rescale,
    /// Demean the raw column, then map the convolved one onto the raw metric's range.
    DemeanRescale,
    /// Standardise both columns.
    Zscore,
    /// Demean both columns.
    Demean,
    None,
}

/// Linear convolution of `signal` with `kernel`.
pub fn convolve(signal: &[f64], kernel: &[f64], mode: ConvolutionMode) -> Result<Vec<f64>> {
    if signal.is_empty() || kernel.is_empty() {
        return Err(MetricError::invalid("convolution needs a non-empty signal and kernel"));
    }
    if mode == ConvolutionMode::Same && kernel.len() > signal.len() {
        return Err(MetricError::invalid(format!(
            "kernel of {} samples is longer than the {}-sample signal",
            kernel.len(),
            signal.len()
        )));
    }
    let mut full = if signal.len().min(kernel.len()) <= DIRECT_CONVOLUTION_MAX {
        direct_convolve(signal, kernel)
    } else {
        fft_convolve(signal, kernel)?
    };
    if mode == ConvolutionMode::Same {
        full.truncate(signal.len());
    }
    Ok(full)
}

fn direct_convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; signal.len() + kernel.len() - 1];
    for (i, &s) in signal.iter().enumerate() {
        for (j, &k) in kernel.iter().enumerate() {
            out[i + j] += s * k;
        }
    }
    out
}

fn fft_convolve(signal: &[f64], kernel: &[f64]) -> Result<Vec<f64>> {
    let out_len = signal.len() + kernel.len() - 1;
    let n = out_len.next_power_of_two();
    debug!(
        "FFT convolution of {} x {} samples (size {n})",
        signal.len(),
        kernel.len()
    );
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut buf_signal = vec![0.0; n];
    buf_signal[..signal.len()].copy_from_slice(signal);
    let mut buf_kernel = vec![0.0; n];
    buf_kernel[..kernel.len()].copy_from_slice(kernel);

    let mut spec_signal = r2c.make_output_vec();
    let mut spec_kernel = r2c.make_output_vec();
    r2c.process(&mut buf_signal, &mut spec_signal)?;
    r2c.process(&mut buf_kernel, &mut spec_kernel)?;

    for (a, b) in spec_signal.iter_mut().zip(spec_kernel.iter()) {
        *a *= *b;
    }
    // DC and Nyquist bins of a real signal carry no imaginary part.
    if let Some(first) = spec_signal.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = spec_signal.last_mut() {
        last.im = 0.0;
    }

    let mut out = c2r.make_output_vec();
    c2r.process(&mut spec_signal, &mut out)?;
    let scale = 1.0 / n as f64;
    out.truncate(out_len);
    out.iter_mut().for_each(|v| *v *= scale);
    Ok(out)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn map_range(values: &mut [f64], target: (f64, f64)) {
    let (lo, hi) = min_max(values);
    let span = hi - lo;
    for v in values.iter_mut() {
        *v = if span > 0.0 {
            target.0 + (*v - lo) / span * (target.1 - target.0)
        } else {
            target.0
        };
    }
}

/// A metric and its convolution with a response kernel, both rescaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Convolved {
    /// The metric, held at its last value to the convolved length in full mode.
    pub raw: Vec<f64>,
    pub convolved: Vec<f64>,
}

fn demean(values: &mut [f64]) {
    let m = super::mean(values);
    values.iter_mut().for_each(|v| *v -= m);
}

fn zscore(values: &mut [f64]) {
    let m = super::mean(values);
    let sd = super::std_dev(values);
    for v in values.iter_mut() {
        *v = if sd > 0.0 { (*v - m) / sd } else { 0.0 };
    }
}

/// Demean `metric`, convolve it with `kernel` and rescale both series.
///
/// With [`Rescale::Rescale`] the convolved series spans exactly the raw
/// metric's range, so raw and convolved regressors stay comparable. A
/// convolved series with no spread maps onto the raw minimum.
pub fn convolve_and_rescale(
    metric: &[f64],
    kernel: &[f64],
    mode: ConvolutionMode,
    rescale: Rescale,
) -> Result<Convolved> {
    if let Some(pos) = metric.iter().position(|v| !v.is_finite()) {
        return Err(MetricError::invalid(format!(
            "metric holds a non-finite value at sample {pos}; fill undefined samples before convolving"
        )));
    }
    let Some(&last) = metric.last() else {
        return Err(MetricError::invalid("cannot convolve an empty metric"));
    };
    let mean = super::mean(metric);
    let demeaned: Vec<f64> = metric.iter().map(|v| v - mean).collect();
    let mut convolved = convolve(&demeaned, kernel, mode)?;
    let mut raw = metric.to_vec();
    raw.resize(convolved.len(), last);

    match rescale {
        Rescale::Rescale => map_range(&mut convolved, min_max(metric)),
        Rescale::DemeanRescale => {
            demean(&mut raw);
            map_range(&mut convolved, min_max(metric));
        }
        Rescale::Zscore => {
            zscore(&mut raw);
            zscore(&mut convolved);
        }
        Rescale::Demean => {
            demean(&mut raw);
            demean(&mut convolved);
        }
        Rescale::None => {}
    }
    Ok(Convolved { raw, convolved })
}

/// Column-wise [`convolve_and_rescale`] for lagged metrics.
///
/// Returns the rescaled raw columns and the convolved columns.
pub fn convolve_columns(
    metric: &Array2<f64>,
    kernel: &[f64],
    mode: ConvolutionMode,
    rescale: Rescale,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let (rows, cols) = metric.dim();
    let out_rows = match mode {
        ConvolutionMode::Same => rows,
        ConvolutionMode::Full => rows + kernel.len().saturating_sub(1),
    };
    let mut raw = Array2::<f64>::zeros((out_rows, cols));
    let mut convolved = Array2::<f64>::zeros((out_rows, cols));
    for (j, column) in metric.columns().into_iter().enumerate() {
        let out = convolve_and_rescale(&column.to_vec(), kernel, mode, rescale)?;
        raw.column_mut(j).assign(&Array1::from(out.raw));
        convolved.column_mut(j).assign(&Array1::from(out.convolved));
    }
    Ok((raw, convolved))
}
