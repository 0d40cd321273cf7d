pub mod cardiac;
pub mod respiratory;
pub mod retroicor;

pub use cardiac::{
    cardiac_phase, heart_beat_interval, heart_beat_interval_series, heart_rate,
    heart_rate_variability,
};
pub use respiratory::{
    envelope, respiratory_pattern_variability, respiratory_phase, respiratory_variance,
    respiratory_variance_time,
};
pub use retroicor::{fourier_expansion, retroicor, retroicor_slices};
