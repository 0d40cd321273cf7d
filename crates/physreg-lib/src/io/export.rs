//! Writing regressors to disk at the native rate and resampled to the TR.
//!
//! Every column goes to its own plain-text file, one `%.6f` value per line:
//! `<prefix>_orig[_<label>]<ext>` and `<prefix>_resampled[_<label>]<ext>`.
//! The metric call is written next to them as `<prefix>_call.json`.

use crate::{
    compute::Regressor,
    error::{MetricError, Result},
    utils::{fit_timepoints, resample_columns},
};
use csv::{Terminator, WriterBuilder};
use log::{debug, info};
use ndarray::ArrayView1;
use serde::Serialize;
use std::{
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    /// Rows written to every resampled file.
    pub timepoints: usize,
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn column_suffix(stage: &str, label: &str, ext: &str) -> String {
    if label.is_empty() {
        format!("_{stage}{ext}")
    } else {
        format!("_{stage}_{label}{ext}")
    }
}

fn temp_in(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}

/// Write `column` to `path` through a temporary file that is renamed into place.
fn write_column(path: &Path, column: ArrayView1<'_, f64>) -> Result<()> {
    let mut tmp = temp_in(path)?;
    {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .delimiter(b' ')
            .terminator(Terminator::Any(b'\n'))
            .from_writer(tmp.as_file_mut());
        for v in column.iter() {
            writer
                .write_record([format!("{v:.6}")])
                .map_err(std::io::Error::from)?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| MetricError::Io(e.error))?;
    Ok(())
}

fn write_call(path: &Path, regressor: &Regressor) -> Result<()> {
    let mut tmp = temp_in(path)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), &regressor.call)?;
    tmp.as_file_mut().write_all(b"\n")?;
    tmp.persist(path).map_err(|e| MetricError::Io(e.error))?;
    Ok(())
}

/// Export `regressor` at its native rate and resampled to `tr`, keeping `ntp`
/// timepoints when given.
///
/// Resampling and the timepoint check happen before anything is written, so an
/// insufficient recording leaves the target directory untouched.
pub fn export_regressor(
    regressor: &Regressor,
    tr: f64,
    prefix: &Path,
    ntp: Option<usize>,
    ext: &str,
) -> Result<ExportSummary> {
    if regressor.labels.len() != regressor.data.ncols() {
        return Err(MetricError::invalid(format!(
            "{} labels for {} regressor columns",
            regressor.labels.len(),
            regressor.data.ncols()
        )));
    }
    let resampled = resample_columns(&regressor.data, regressor.fs, tr)?;
    let resampled = fit_timepoints(resampled, ntp)?;
    debug!(
        "resampled {} samples at {} Hz to {} volumes at TR {tr} s",
        regressor.n_samples(),
        regressor.fs,
        resampled.nrows()
    );

    let mut files = Vec::with_capacity(2 * regressor.labels.len() + 1);
    for (j, label) in regressor.labels.iter().enumerate() {
        let orig = with_suffix(prefix, &column_suffix("orig", label, ext));
        write_column(&orig, regressor.data.column(j))?;
        files.push(orig);
        let res = with_suffix(prefix, &column_suffix("resampled", label, ext));
        write_column(&res, resampled.column(j))?;
        files.push(res);
    }
    let call_path = with_suffix(prefix, "_call.json");
    write_call(&call_path, regressor)?;
    files.push(call_path);
    info!(
        "exported {} regressor to {} files with prefix {}",
        regressor.call.metric,
        files.len(),
        prefix.display()
    );
    Ok(ExportSummary {
        files,
        timepoints: resampled.nrows(),
    })
}
