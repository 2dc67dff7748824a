use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use gain_profile::{
    construct_audiogram, derive_gain_profile, list_methods, Audiogram, AudiometricThresholds,
    DeriveParams, EarRecord, GainProfile, ReferenceMethod, SmoothingMethod, FREQS, FREQ_COUNT,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hearing-aid gain profile CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the per-frequency gain profile for one ear
    Derive(DeriveArgs),
    /// Tabulate the audiogram (frequency, threshold) for one ear
    Audiogram(AudiogramArgs),
    /// List the available reference and smoothing methods as JSON
    Methods(MethodsArgs),
}

#[derive(Args, Debug)]
struct ThresholdInput {
    /// Six thresholds in dB HL for 250,500,1000,2000,4000,8000 Hz (comma separated)
    #[arg(
        long,
        allow_hyphen_values = true,
        conflicts_with = "record",
        required_unless_present = "record"
    )]
    thresholds: Option<String>,

    /// JSON measurement record with threshold_250 .. threshold_8000 columns
    #[arg(long, value_hint = ValueHint::FilePath)]
    record: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DeriveArgs {
    #[command(flatten)]
    input: ThresholdInput,

    /// Reference threshold method
    #[arg(long, value_enum)]
    reference: Option<ReferenceOpt>,

    /// Gain per dB of deficit
    #[arg(long, allow_negative_numbers = true)]
    compression_ratio: Option<f64>,

    /// Gain ceiling (dB)
    #[arg(long, allow_negative_numbers = true)]
    max_gain: Option<f64>,

    /// Smoothing applied after capping
    #[arg(long, value_enum)]
    smoothing: Option<SmoothingOpt>,

    /// JSON parameter file; explicit flags take precedence
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatOpt::Csv)]
    format: FormatOpt,

    /// Output path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct AudiogramArgs {
    #[command(flatten)]
    input: ThresholdInput,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct MethodsArgs {
    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ReferenceOpt {
    Min,
    #[value(name = "median_mid")]
    MedianMid,
    Pta4,
}

impl From<ReferenceOpt> for ReferenceMethod {
    fn from(value: ReferenceOpt) -> Self {
        match value {
            ReferenceOpt::Min => ReferenceMethod::Min,
            ReferenceOpt::MedianMid => ReferenceMethod::MedianMid,
            ReferenceOpt::Pta4 => ReferenceMethod::Pta4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SmoothingOpt {
    None,
    Ma3,
}

impl From<SmoothingOpt> for SmoothingMethod {
    fn from(value: SmoothingOpt) -> Self {
        match value {
            SmoothingOpt::None => SmoothingMethod::None,
            SmoothingOpt::Ma3 => SmoothingMethod::Ma3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatOpt {
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Derive(args) => args.verbose,
        Command::Audiogram(args) => args.verbose,
        Command::Methods(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Derive(args) => handle_derive(args),
        Command::Audiogram(args) => handle_audiogram(args),
        Command::Methods(_) => handle_methods(),
    }
}

fn handle_derive(args: DeriveArgs) -> Result<()> {
    let record = load_input(&args.input)?;
    let params = build_params(&args)?;
    debug!(
        "Params: reference={}, compression_ratio={}, max_gain={}, smoothing={}",
        params.reference_method, params.compression_ratio, params.max_gain, params.smoothing_method
    );

    let profile = derive_gain_profile(&record.thresholds, &params);
    info!(
        "Gain profile derived: tref {:.2} dB HL, peak gain {:.2} dB ({})",
        profile.reference_threshold(),
        profile.gains().iter().copied().fold(0.0, f64::max),
        record.caption()
    );

    match args.format {
        FormatOpt::Csv => with_output(&args.output, |out| {
            let mut writer = csv::Writer::from_writer(out);
            write_profile_rows(&profile, &mut writer)
        })?,
        FormatOpt::Json => with_output(&args.output, |out| {
            serde_json::to_writer_pretty(&mut *out, &profile)?;
            writeln!(out)?;
            Ok(())
        })?,
    }
    if args.output.as_os_str() != "-" {
        info!("Wrote gain profile: {}", args.output.display());
    }
    Ok(())
}

fn handle_audiogram(args: AudiogramArgs) -> Result<()> {
    let record = load_input(&args.input)?;
    let audiogram = construct_audiogram(&record);
    info!("{}", audiogram.caption);
    with_output(&args.output, |out| {
        let mut writer = csv::Writer::from_writer(out);
        write_audiogram_rows(&audiogram, &mut writer)
    })?;
    if args.output.as_os_str() != "-" {
        info!("Wrote audiogram: {}", args.output.display());
    }
    Ok(())
}

fn handle_methods() -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &list_methods())?;
    writeln!(handle)?;
    Ok(())
}

fn build_params(args: &DeriveArgs) -> Result<DeriveParams> {
    let mut params = match args.config.as_ref() {
        Some(path) => load_params(path)?,
        None => DeriveParams::default(),
    };
    if let Some(reference) = args.reference {
        params.reference_method = reference.into();
    }
    if let Some(ratio) = args.compression_ratio {
        params.compression_ratio = ratio;
    }
    if let Some(max_gain) = args.max_gain {
        params.max_gain = max_gain;
    }
    if let Some(smoothing) = args.smoothing {
        params.smoothing_method = smoothing.into();
    }
    if params.compression_ratio < 0.0 || params.max_gain < 0.0 {
        warn!(
            "Negative compression ratio ({}) or max gain ({}); gains may fall below zero",
            params.compression_ratio, params.max_gain
        );
    }
    Ok(params)
}

fn load_params(path: &Path) -> Result<DeriveParams> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let params: DeriveParams = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid parameter file", path.display()))?;
    Ok(params)
}

fn load_input(input: &ThresholdInput) -> Result<EarRecord> {
    match (input.thresholds.as_ref(), input.record.as_ref()) {
        (Some(list), _) => Ok(EarRecord::new(parse_threshold_list(list)?.into())),
        (None, Some(path)) => load_record(path),
        (None, None) => Err(anyhow!("either --thresholds or --record is required")),
    }
}

fn load_record(path: &Path) -> Result<EarRecord> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read record {}", path.display()))?;
    let record: EarRecord = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid measurement record", path.display()))?;
    Ok(record)
}

fn parse_threshold_list(input: &str) -> Result<[f64; FREQ_COUNT]> {
    let tokens: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() != FREQ_COUNT {
        return Err(anyhow!(
            "expected {} thresholds ({}), got {}",
            FREQ_COUNT,
            FREQS.map(|f| f.to_string()).join(","),
            tokens.len()
        ));
    }
    let mut values = [0.0; FREQ_COUNT];
    for ((slot, token), freq) in values.iter_mut().zip(tokens).zip(FREQS) {
        let value: f64 = token
            .parse()
            .with_context(|| format!("invalid threshold '{}' for {} Hz", token, freq))?;
        if !value.is_finite() {
            return Err(anyhow!("threshold for {} Hz must be finite, got '{}'", freq, token));
        }
        *slot = value;
    }
    Ok(values)
}

fn with_output<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write(&mut handle)
    } else {
        let mut file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        write(&mut file)
    }
}

fn write_profile_rows<W: Write>(profile: &GainProfile, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "freq_hz",
        "gain",
        "reference_threshold",
        "compression_ratio",
        "max_gain",
        "reference_method",
        "smoothing",
    ])?;
    for entry in profile.iter() {
        writer.write_record([
            entry.freq_hz.to_string(),
            format!("{:.2}", entry.gain),
            entry.reference_threshold.to_string(),
            entry.compression_ratio.to_string(),
            entry.max_gain.to_string(),
            entry.reference_method.id().to_string(),
            entry.smoothing.id().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_audiogram_rows<W: Write>(audiogram: &Audiogram, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["freq_hz", "threshold"])?;
    for point in &audiogram.points {
        writer.write_record([point.freq_hz.to_string(), point.threshold.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
