use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tempfile::tempdir;

/// 80 s pulse recording at 100 Hz with a beat roughly every second.
fn write_cardiac(dir: &Path) -> (PathBuf, PathBuf) {
    let wave = dir.join("pulse.txt");
    let samples: Vec<String> = (0..8000)
        .map(|i| format!("{:.4}", (i as f64 * 0.063).sin()))
        .collect();
    fs::write(&wave, samples.join("\n")).unwrap();
    let peaks = dir.join("pulse_peaks.txt");
    let indices: Vec<String> = (0..78)
        .map(|k| (40 + k * 100 + (k % 4) * 6).to_string())
        .collect();
    fs::write(&peaks, indices.join("\n")).unwrap();
    (wave, peaks)
}

/// 60 s breathing belt at 25 Hz with a 4 s breath.
fn write_respiratory(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let wave = dir.join("belt.txt");
    let samples: Vec<String> = (0..1500)
        .map(|i| format!("{:.6}", (std::f64::consts::TAU * i as f64 / 100.0).cos()))
        .collect();
    fs::write(&wave, samples.join("\n")).unwrap();
    let peaks = dir.join("belt_peaks.txt");
    let troughs = dir.join("belt_troughs.txt");
    let p: Vec<String> = (0..15).map(|k| (k * 100).to_string()).collect();
    let t: Vec<String> = (0..15).map(|k| (k * 100 + 50).to_string()).collect();
    fs::write(&peaks, p.join("\n")).unwrap();
    fs::write(&troughs, t.join("\n")).unwrap();
    (wave, peaks, troughs)
}

fn arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

#[test]
fn heart_rate_exports_requested_timepoints() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let (wave, peaks) = write_cardiac(temp.path());
    let out = temp.path().join("out");

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "heart-rate",
        "--fs",
        "100",
        "--cardiac",
        &arg(&wave),
        "--cardiac-peaks",
        &arg(&peaks),
        "--tr",
        "2",
        "--ntp",
        "40",
        "--outdir",
        &arg(&out),
        "--prefix",
        "sub-01_hr",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;

    assert_eq!(summary["metric"], "heart-rate");
    assert_eq!(summary["samples"], 8000);
    assert_eq!(summary["timepoints"], 40);
    assert_eq!(summary["params"]["smoothing_window_s"], 6.0);

    let resampled = fs::read_to_string(out.join("sub-01_hr_resampled.1D"))?;
    assert_eq!(resampled.lines().count(), 40);
    for line in resampled.lines() {
        let bpm: f64 = line.parse()?;
        assert!((50.0..70.0).contains(&bpm), "heart rate {bpm}");
    }
    let orig = fs::read_to_string(out.join("sub-01_hr_orig.1D"))?;
    assert_eq!(orig.lines().count(), 8000);
    let call: Value = serde_json::from_str(&fs::read_to_string(out.join("sub-01_hr_call.json"))?)?;
    assert_eq!(call["metric"], "heart-rate");
    Ok(())
}

#[test]
fn too_many_timepoints_is_reported() {
    let temp = tempdir().unwrap();
    let (wave, peaks) = write_cardiac(temp.path());
    let out = temp.path().join("out");

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "heart-rate",
        "--fs",
        "100",
        "--cardiac",
        &arg(&wave),
        "--cardiac-peaks",
        &arg(&peaks),
        "--tr",
        "2",
        "--ntp",
        "1000",
        "--outdir",
        &arg(&out),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("insufficient data"), "{stderr}");
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
}

#[test]
fn rvt_prints_lag_columns_without_tr() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let (wave, peaks, troughs) = write_respiratory(temp.path());

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "respiratory-variance-time",
        "--fs",
        "25",
        "--respiratory",
        &arg(&wave),
        "--respiratory-peaks",
        &arg(&peaks),
        "--respiratory-troughs",
        &arg(&troughs),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(
        summary["columns"],
        serde_json::json!(["lag-0", "lag-4", "lag-8", "lag-12"])
    );
    assert_eq!(summary["files"], serde_json::json!([]));
    assert!(summary.get("timepoints").is_none());
    Ok(())
}

#[test]
fn lags_and_convolution_from_flags() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let (wave, peaks, troughs) = write_respiratory(temp.path());
    let out = temp.path().join("out");

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "envelope",
        "--fs",
        "25",
        "--respiratory",
        &arg(&wave),
        "--respiratory-peaks",
        &arg(&peaks),
        "--respiratory-troughs",
        &arg(&troughs),
        "--lags",
        "0,-2",
        "--convolve",
        "--tr",
        "1.5",
        "--outdir",
        &arg(&out),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(
        summary["columns"],
        serde_json::json!(["raw_lag-0", "raw_lag--2", "convolved_lag-0", "convolved_lag--2"])
    );
    assert_eq!(summary["params"]["kernel"]["kind"], "rrf");
    assert!(out.join("envelope_resampled_convolved_lag--2.1D").exists());
    assert_eq!(summary["timepoints"], 40);
    Ok(())
}

#[test]
fn config_file_overrides_defaults() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let (wave, peaks, troughs) = write_respiratory(temp.path());
    let config = temp.path().join("physreg.toml");
    fs::write(&config, "[respiratory_pattern_variability]\nwindow_s = 2.0\n")?;

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "respiratory-pattern-variability",
        "--fs",
        "25",
        "--respiratory",
        &arg(&wave),
        "--respiratory-peaks",
        &arg(&peaks),
        "--respiratory-troughs",
        &arg(&troughs),
        "--config",
        &arg(&config),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["params"]["window_s"], 2.0);
    Ok(())
}

#[test]
fn retroicor_combines_modalities() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let (wave, peaks, troughs) = write_respiratory(temp.path());
    let cardiac_peaks = temp.path().join("card_peaks.txt");
    let beats: Vec<String> = (0..60).map(|k| (12 + k * 24).to_string()).collect();
    fs::write(&cardiac_peaks, beats.join("\n"))?;

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "retroicor",
        "--fs",
        "25",
        "--cardiac",
        &arg(&wave),
        "--cardiac-peaks",
        &arg(&cardiac_peaks),
        "--respiratory",
        &arg(&wave),
        "--respiratory-peaks",
        &arg(&peaks),
        "--respiratory-troughs",
        &arg(&troughs),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    let columns = summary["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 10);
    assert_eq!(columns[0], "cardiac-cos-1");
    assert_eq!(columns[6], "respiratory-cos-1");
    Ok(())
}

#[test]
fn unknown_metric_is_rejected() {
    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args(["compute", "--metric", "pulse-pressure", "--fs", "100"]);
    cmd.assert().failure();
}

#[test]
fn missing_recording_is_reported() {
    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args(["compute", "--metric", "heart-rate", "--fs", "100"]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("needs a cardiac recording"));
}

#[test]
fn peaks_outside_recording_are_reported_with_path() {
    let temp = tempdir().unwrap();
    let (wave, _) = write_cardiac(temp.path());
    let peaks = temp.path().join("late_peaks.txt");
    fs::write(&peaks, "100\n200\n9000\n").unwrap();

    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args([
        "compute",
        "--metric",
        "heart-rate",
        "--fs",
        "100",
        "--cardiac",
        &arg(&wave),
        "--cardiac-peaks",
        &arg(&peaks),
    ]);
    let output = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("cardiac peaks in"), "{stderr}");
    assert!(stderr.contains("late_peaks.txt"), "{stderr}");
    assert!(stderr.contains("outside a waveform of 8000 samples"), "{stderr}");
}

#[test]
fn kernel_prints_normalised_values() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.args(["kernel", "crf", "--fs", "10"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let values: Vec<f64> = String::from_utf8(output)?
        .lines()
        .map(str::parse)
        .collect::<Result<_, _>>()?;
    assert_eq!(values.len(), 320);
    let peak = values.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
    assert!((peak - 1.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn config_prints_default_toml() {
    let mut cmd = cargo_bin_cmd!("physreg");
    cmd.arg("config");
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("[respiratory_variance_time]"));
    assert!(text.contains("lags_s = [0.0, 4.0, 8.0, 12.0]") || text.contains("lags_s = ["));
}
