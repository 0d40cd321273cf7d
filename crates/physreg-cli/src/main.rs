use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, LevelFilter};
use physreg_lib::{
    compute::{compute_metric, MetricKind, PhysioInputs, Recording},
    config::PhysregConfig,
    io::{export::export_regressor, text as text_io},
    responses::ResponseKernel,
    signal::Events,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "physreg",
    version,
    about = "Physiological noise regressors for fMRI from cardiac and respiratory recordings"
)]
struct Cli {
    /// Verbose logging (debug level)
    #[arg(long, global = true, conflicts_with = "quiet")]
    debug: bool,
    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KernelArg {
    #[value(name = "crf")]
    Crf,
    #[value(name = "icrf")]
    Icrf,
    #[value(name = "rrf")]
    Rrf,
    #[value(name = "irf")]
    Irf,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one regressor and print a JSON summary; exports files when a TR is known
    Compute {
        /// Metric name, e.g. heart-rate or respiratory-variance-time
        #[arg(long)]
        metric: MetricKind,
        /// Sample rate of the recordings in Hz
        #[arg(long)]
        fs: f64,
        /// Cardiac recording (one sample per line, or a table with --column)
        #[arg(long)]
        cardiac: Option<PathBuf>,
        /// Cardiac peak sample indices
        #[arg(long)]
        cardiac_peaks: Option<PathBuf>,
        /// Respiratory belt recording
        #[arg(long)]
        respiratory: Option<PathBuf>,
        #[arg(long)]
        respiratory_peaks: Option<PathBuf>,
        #[arg(long)]
        respiratory_troughs: Option<PathBuf>,
        /// Column of the recording files to read
        #[arg(long, default_value_t = 0)]
        column: usize,
        /// TOML file with metric options
        #[arg(long)]
        config: Option<PathBuf>,
        /// Lags in seconds, comma separated (overrides the config)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        lags: Option<Vec<f64>>,
        /// Convolve with the metric's response kernel
        #[arg(long)]
        convolve: bool,
        /// Repetition time of the imaging data in seconds
        #[arg(long)]
        tr: Option<f64>,
        /// Number of imaging timepoints to export
        #[arg(long)]
        ntp: Option<usize>,
        #[arg(long, default_value = ".")]
        outdir: PathBuf,
        /// File name prefix; defaults to the metric name
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print a response kernel, one value per line
    Kernel {
        #[arg(value_enum)]
        kind: KernelArg,
        #[arg(long)]
        fs: f64,
        /// Kernel duration in seconds; defaults to the kernel's canonical length
        #[arg(long)]
        time_length: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        onset: f64,
        /// Peak time of the impulse response (irf only)
        #[arg(long, default_value_t = 6.0)]
        peak: f64,
        /// Dispersion of the impulse response (irf only)
        #[arg(long, default_value_t = 0.9)]
        dispersion: f64,
    },
    /// Print the default configuration as TOML
    Config,
}

#[derive(Serialize)]
struct ComputeSummary {
    metric: MetricKind,
    fs: f64,
    samples: usize,
    columns: Vec<String>,
    params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    timepoints: Option<usize>,
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);
    match cli.command {
        Commands::Compute {
            metric,
            fs,
            cardiac,
            cardiac_peaks,
            respiratory,
            respiratory_peaks,
            respiratory_troughs,
            column,
            config,
            lags,
            convolve,
            tr,
            ntp,
            outdir,
            prefix,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(lags) = lags {
                if metric == MetricKind::RespiratoryVarianceTime {
                    cfg.respiratory_variance_time.lags_s = lags;
                } else {
                    cfg.lags.lags_s = lags;
                }
            }
            if convolve {
                cfg.convolution.enabled = true;
            }
            if tr.is_some() {
                cfg.export.tr = tr;
            }
            if ntp.is_some() {
                cfg.export.ntp = ntp;
            }
            let inputs = PhysioInputs {
                cardiac: load_recording(
                    fs,
                    column,
                    cardiac.as_deref(),
                    cardiac_peaks.as_deref(),
                    None,
                    "cardiac",
                )?,
                respiratory: load_recording(
                    fs,
                    column,
                    respiratory.as_deref(),
                    respiratory_peaks.as_deref(),
                    respiratory_troughs.as_deref(),
                    "respiratory",
                )?,
            };
            let prefix = prefix.unwrap_or_else(|| metric.name().to_string());
            cmd_compute(metric, &inputs, &cfg, &outdir, &prefix)?
        }
        Commands::Kernel {
            kind,
            fs,
            time_length,
            onset,
            peak,
            dispersion,
        } => cmd_kernel(kind, fs, time_length, onset, peak, dispersion)?,
        Commands::Config => print!("{}", PhysregConfig::default().to_toml_string()?),
    }
    Ok(())
}

fn init_logging(debug: bool, quiet: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PhysregConfig> {
    match path {
        Some(path) => PhysregConfig::load(path),
        None => Ok(PhysregConfig::default()),
    }
}

fn load_recording(
    fs: f64,
    column: usize,
    waveform: Option<&Path>,
    peaks: Option<&Path>,
    troughs: Option<&Path>,
    what: &str,
) -> Result<Option<Recording>> {
    let Some(waveform) = waveform else {
        if peaks.is_some() || troughs.is_some() {
            bail!("{what} events were given without a {what} recording");
        }
        return Ok(None);
    };
    let waveform = text_io::read_waveform(waveform, column, fs)?;
    let peaks = load_events(peaks, waveform.len(), what, "peaks")?;
    let troughs = load_events(troughs, waveform.len(), what, "troughs")?;
    debug!(
        "{what} recording: {} samples, {} peaks, {} troughs",
        waveform.len(),
        peaks.len(),
        troughs.len()
    );
    Ok(Some(Recording::new(waveform, peaks, troughs)))
}

fn load_events(path: Option<&Path>, n_samples: usize, what: &str, kind: &str) -> Result<Events> {
    let Some(path) = path else {
        return Ok(Events::default());
    };
    let events = text_io::read_events(path)?;
    events
        .validate(n_samples)
        .with_context(|| format!("{what} {kind} in {}", path.display()))?;
    Ok(events)
}

fn cmd_compute(
    metric: MetricKind,
    inputs: &PhysioInputs,
    cfg: &PhysregConfig,
    outdir: &Path,
    prefix: &str,
) -> Result<()> {
    let regressor = compute_metric(metric, inputs, cfg)
        .with_context(|| format!("computing {metric}"))?;
    let mut summary = ComputeSummary {
        metric,
        fs: regressor.fs,
        samples: regressor.n_samples(),
        columns: regressor.labels.clone(),
        params: serde_json::to_value(&regressor.call.params)?,
        timepoints: None,
        files: Vec::new(),
    };
    if let Some(tr) = cfg.export.tr {
        std::fs::create_dir_all(outdir)
            .with_context(|| format!("creating output directory {}", outdir.display()))?;
        let exported = export_regressor(
            &regressor,
            tr,
            &outdir.join(prefix),
            cfg.export.ntp,
            &cfg.export.extension,
        )
        .with_context(|| format!("exporting {metric} to {}", outdir.display()))?;
        summary.timepoints = Some(exported.timepoints);
        summary.files = exported.files;
    }
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_kernel(
    kind: KernelArg,
    fs: f64,
    time_length: Option<f64>,
    onset: f64,
    peak: f64,
    dispersion: f64,
) -> Result<()> {
    let kernel = match kind {
        KernelArg::Crf => ResponseKernel::Crf,
        KernelArg::Icrf => ResponseKernel::Icrf,
        KernelArg::Rrf => ResponseKernel::Rrf,
        KernelArg::Irf => ResponseKernel::Irf { peak, dispersion },
    };
    let time_length = time_length.unwrap_or_else(|| kernel.default_time_length());
    let values = kernel.build(fs, time_length, onset)?;
    for v in values {
        println!("{v:.6}");
    }
    Ok(())
}
