pub mod compute;
pub mod config;
pub mod error;
pub mod io;
pub mod metrics;
pub mod responses;
pub mod signal;
pub mod utils;

pub use compute::{compute_metric, MetricCall, MetricKind, PhysioInputs, Recording, Regressor};
pub use config::PhysregConfig;
pub use error::{MetricError, Result};
pub use signal::*;
