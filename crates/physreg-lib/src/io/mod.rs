pub mod export;
pub mod text;

pub use export::{export_regressor, ExportSummary};
