//! # Tuner - command-line front end
//!
//! Captures the default microphone, feeds the tuner core and prints every
//! accepted detection with its tuning status. On exit the detection history
//! is printed (or written) as JSON, newest first.
//!
//! ## Architecture
//! - **Main thread**: owns the CPAL stream and prints detector outcomes
//! - **Analysis thread**: owned by `tuner_core::Detector`, ticks every 50 ms
//! - **Communication**: crossbeam channels in both directions

mod capture;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::select;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tuner_core::{
    Algorithm, Detection, DetectionRecord, Detector, Indicator, SAMPLE_RATE, TuningConfig,
    TuningPreset, TuningStatus,
};

#[derive(Debug, Parser)]
#[command(name = "tuner", version, about = "Real-time instrument tuner")]
struct Args {
    /// JSON file with tuning settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frequency of A4 in Hz
    #[arg(short, long)]
    reference: Option<f32>,

    /// In-tune band half-width in cents
    #[arg(short, long)]
    tolerance: Option<f32>,

    /// TimeDomain, Autocorrelation or SpectralPeak
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Standard, "Drop D", "Open G" or DADGAD
    #[arg(short, long)]
    preset: Option<TuningPreset>,

    /// Only accept notes of the selected preset
    #[arg(short, long)]
    guitar: bool,

    /// How long to listen, in seconds
    #[arg(short, long, default_value_t = 60)]
    seconds: u64,

    /// Write the history JSON here instead of stdout
    #[arg(long)]
    history: Option<PathBuf>,

    /// Print the presets and their string frequencies, then exit
    #[arg(long)]
    list_presets: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(&args)?;

    if args.list_presets {
        print_presets(config.reference_pitch);
        return Ok(());
    }

    let input = capture::open_default_input(SAMPLE_RATE)?;
    let detector = Detector::spawn(config.clone(), input.sample_rate())?;
    let stream = input.start(detector.capture_sink())?;

    info!(
        "Listening for {} s: A4={} Hz, ±{} cents, {}, guitar mode {} ({})",
        args.seconds,
        config.reference_pitch,
        config.tolerance_cents,
        config.algorithm,
        config.guitar_mode,
        config.preset
    );

    let deadline = crossbeam_channel::after(Duration::from_secs(args.seconds));
    let mut last_note: Option<String> = None;
    loop {
        select! {
            recv(detector.outcomes()) -> outcome => match outcome {
                Ok(Ok(detection)) => {
                    print_detection(&detection, last_note.as_deref());
                    last_note = Some(detection.note.display_note);
                }
                Ok(Err(rejection)) => debug!("no note: {rejection}"),
                Err(_) => {
                    warn!("Detector closed unexpectedly");
                    break;
                }
            },
            recv(deadline) -> _ => break,
        }
    }

    drop(stream);
    let history = detector.history_snapshot();
    detector.shutdown();

    write_history(history, args.history.as_deref())
}

/// Loads the config file (if any), applies flag overrides and validates.
fn load_config(args: &Args) -> Result<TuningConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TuningConfig::default(),
    };

    if let Some(reference) = args.reference {
        config.reference_pitch = reference;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance_cents = tolerance;
    }
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(preset) = args.preset {
        config.preset = preset;
    }
    config.guitar_mode |= args.guitar;

    Ok(config.validated()?)
}

fn print_presets(reference_pitch: f32) {
    for preset in TuningPreset::ALL {
        let strings: Vec<String> = preset
            .notes()
            .iter()
            .zip(preset.target_frequencies(reference_pitch))
            .map(|(note, freq)| format!("{note} {freq:.2}"))
            .collect();
        println!("{:<9} {}", preset.name(), strings.join("  "));
    }
}

fn print_detection(detection: &Detection, previous_note: Option<&str>) {
    let marker = if previous_note == Some(detection.note.display_note.as_str()) {
        ' '
    } else {
        '*'
    };
    println!(
        "{marker} {:<4} {:>8.2} Hz {:>+6.1} cents  conf {:.2}  {}",
        detection.note.display_note,
        detection.estimate.frequency,
        detection.note.cents_offset,
        detection.estimate.confidence,
        status_label(detection.evaluation.status)
    );
}

fn status_label(status: TuningStatus) -> String {
    let light = match status.indicator() {
        Indicator::Off => "--",
        Indicator::Green => "ok",
        Indicator::Amber => "~~",
        Indicator::Red => "!!",
    };
    let band = match status {
        TuningStatus::NoSignal => "NoSignal",
        TuningStatus::InTune => "InTune",
        TuningStatus::SlightlyOff(_) => "SlightlyOff",
        TuningStatus::OutOfTune(_) => "OutOfTune",
    };
    match status.direction() {
        Some(direction) => format!("[{light}] {band} ({direction:?})"),
        None => format!("[{light}] {band}"),
    }
}

/// Writes the history newest first, as pretty JSON.
fn write_history(mut history: Vec<DetectionRecord>, path: Option<&Path>) -> Result<()> {
    history.reverse();
    let json = serde_json::to_string_pretty(&history)?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Saved {} detections to {}", history.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
