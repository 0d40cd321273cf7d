//! Plain-text physiological recordings and event lists.
//!
//! Values may be separated by whitespace, commas or tabs; blank lines and
//! lines starting with `#` are skipped.

use crate::signal::{Events, Waveform};
use anyhow::{bail, Context, Result};
use std::{fs, path::Path, str::FromStr};

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
}

/// Parse one column of a delimited text table.
pub fn parse_column<T>(text: &str, column: usize, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(field) = fields(trimmed).nth(column) else {
            bail!("line {} has no column {column}: {trimmed}", idx + 1);
        };
        let val: T = field
            .parse()
            .with_context(|| format!("line {} is not a valid {what}: {field}", idx + 1))?;
        out.push(val);
    }
    Ok(out)
}

/// Samples of `column`, rejecting recordings with no samples.
pub fn parse_samples(text: &str, column: usize) -> Result<Vec<f64>> {
    let samples = parse_column(text, column, "sample")?;
    if samples.is_empty() {
        bail!("no numeric samples found");
    }
    Ok(samples)
}

/// Read a recording sampled at `fs` from `column` of a text file.
pub fn read_waveform(path: &Path, column: usize, fs: f64) -> Result<Waveform> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let data = parse_samples(&text, column)
        .with_context(|| format!("parsing recording {}", path.display()))?;
    Waveform::new(data, fs).with_context(|| format!("invalid recording {}", path.display()))
}

/// Parse newline-delimited sample indices. An empty list is allowed.
pub fn parse_events(text: &str) -> Result<Events> {
    Ok(Events::from_indices(parse_column(text, 0, "sample index")?))
}

pub fn read_events(path: &Path) -> Result<Events> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_events(&text).with_context(|| format!("parsing events {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_column_with_comments() {
        let samples = parse_samples("# belt\n0.5\n\n-1.25\n 3 \n", 0).unwrap();
        assert_eq!(samples, vec![0.5, -1.25, 3.0]);
    }

    #[test]
    fn selects_column_of_table() {
        let text = "0.00\t1.0,9\n0.01 2.0 8\n";
        assert_eq!(parse_samples(text, 1).unwrap(), vec![1.0, 2.0]);
        assert_eq!(parse_samples(text, 2).unwrap(), vec![9.0, 8.0]);
        let err = parse_samples(text, 3).unwrap_err();
        assert!(err.to_string().contains("no column 3"));
    }

    #[test]
    fn reports_bad_line() {
        let err = parse_samples("1.0\nabc\n", 0).unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_samples("# nothing\n", 0).is_err());
    }

    #[test]
    fn events_are_indices() {
        let events = parse_events("100\n250\n400\n").unwrap();
        assert_eq!(events.indices, vec![100, 250, 400]);
        assert!(parse_events("").unwrap().is_empty());
        assert!(parse_events("1.5\n").is_err());
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let wave = dir.path().join("pulse.tsv");
        fs::write(&wave, "0.1\n0.2\n0.3\n").unwrap();
        let w = read_waveform(&wave, 0, 50.0).unwrap();
        assert_eq!(w.len(), 3);
        assert_eq!(w.fs, 50.0);
        assert!(read_waveform(&wave, 0, 0.0).is_err());

        let peaks = dir.path().join("peaks.txt");
        fs::write(&peaks, "1\n2\n").unwrap();
        assert_eq!(read_events(&peaks).unwrap().len(), 2);
        let err = read_events(&dir.path().join("absent.txt")).unwrap_err();
        assert!(err.to_string().contains("absent.txt"));
    }
}
