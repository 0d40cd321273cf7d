use crate::error::{MetricError, Result};
use serde::{Deserialize, Serialize};

/// Uniformly sampled physiological recording (cardiac pulse or respiratory belt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    /// Sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl Waveform {
    /// Build a waveform, rejecting empty data and non-positive sample rates.
    pub fn new(data: Vec<f64>, fs: f64) -> Result<Self> {
        let ts = Self { fs, data };
        ts.validate()?;
        Ok(ts)
    }

    pub fn validate(&self) -> Result<()> {
        validate_sample_rate(self.fs)?;
        if self.data.is_empty() {
            return Err(MetricError::invalid("waveform has no samples"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Point events on a timeline (peak or trough sample indices).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Check that indices are strictly increasing and fall inside a waveform of `n_samples`.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        validate_events(&self.indices, n_samples, "events")
    }
}

pub(crate) fn validate_sample_rate(fs: f64) -> Result<()> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(MetricError::invalid(format!(
            "sample rate must be positive and finite, got {fs}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_events(indices: &[usize], n_samples: usize, what: &str) -> Result<()> {
    if let Some(w) = indices.windows(2).find(|w| w[1] <= w[0]) {
        return Err(MetricError::invalid(format!(
            "{what} must be strictly increasing ({} followed by {})",
            w[0], w[1]
        )));
    }
    if let Some(&last) = indices.last() {
        if last >= n_samples {
            return Err(MetricError::invalid(format!(
                "{what} index {last} is outside a waveform of {n_samples} samples"
            )));
        }
    }
    Ok(())
}

/// Index `j` of the event pair `(events[j], events[j + 1])` that brackets sample `i`.
///
/// A sample that falls exactly on an event belongs to the pair starting there.
/// Samples before the first or after the last event use the first or last pair.
/// `events` must hold at least two entries.
pub(crate) fn bracketing_pair(events: &[usize], i: usize) -> usize {
    let k = events.partition_point(|&e| e <= i);
    k.clamp(1, events.len() - 1) - 1
}

pub(crate) fn sample_times(n: usize, fs: f64) -> Vec<f64> {
    (0..n).map(|i| i as f64 / fs).collect()
}

/// Convert a duration in seconds to an odd window width in samples (at least 1).
pub fn window_samples(window_s: f64, fs: f64) -> Result<usize> {
    validate_sample_rate(fs)?;
    if !(window_s.is_finite() && window_s > 0.0) {
        return Err(MetricError::invalid(format!(
            "window must be a positive number of seconds, got {window_s}"
        )));
    }
    let half = (window_s * fs / 2.0).round() as usize;
    half.checked_mul(2)
        .and_then(|w| w.checked_add(1))
        .ok_or_else(|| {
            MetricError::invalid(format!(
                "window of {window_s} s at {fs} Hz does not fit in a sample count"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_sample_rate() {
        assert!(Waveform::new(vec![1.0], 0.0).is_err());
        assert!(Waveform::new(vec![1.0], f64::NAN).is_err());
        assert!(Waveform::new(vec![], 10.0).is_err());
        assert!(Waveform::new(vec![1.0, 2.0], 10.0).is_ok());
    }

    #[test]
    fn events_must_be_sorted_and_in_range() {
        let ev = Events::from_indices(vec![1, 5, 5]);
        assert!(matches!(ev.validate(10), Err(MetricError::InvalidArgument(_))));
        let ev = Events::from_indices(vec![1, 5, 10]);
        assert!(ev.validate(10).is_err());
        let ev = Events::from_indices(vec![0, 5, 9]);
        assert!(ev.validate(10).is_ok());
    }

    #[test]
    fn sample_on_event_starts_next_pair() {
        let events = [10, 20, 40];
        assert_eq!(bracketing_pair(&events, 0), 0);
        assert_eq!(bracketing_pair(&events, 19), 0);
        assert_eq!(bracketing_pair(&events, 20), 1);
        assert_eq!(bracketing_pair(&events, 40), 1);
        assert_eq!(bracketing_pair(&events, 99), 1);
    }

    #[test]
    fn window_in_seconds_is_always_odd() {
        assert_eq!(window_samples(6.0, 100.0).unwrap(), 601);
        assert_eq!(window_samples(0.001, 100.0).unwrap(), 1);
        assert!(window_samples(-1.0, 100.0).is_err());
        assert!(matches!(
            window_samples(1e20, 100.0),
            Err(MetricError::InvalidArgument(_))
        ));
    }
}
