//! Error types shared by every metric.

use thiserror::Error;

/// Errors raised by the metric engine and the export step.
#[derive(Debug, Error)]
pub enum MetricError {
    /// Malformed arguments: bad window sizes, unsorted events, out-of-range lags.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough peaks, troughs or samples to compute the requested quantity.
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize metric call: {0}")]
    Json(#[from] serde_json::Error),

    #[error("FFT backend error: {0}")]
    Fft(#[from] realfft::FftError),
}

impl MetricError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MetricError::InvalidArgument(msg.into())
    }

    pub(crate) fn insufficient(msg: impl Into<String>) -> Self {
        MetricError::DataInsufficient(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MetricError>;
