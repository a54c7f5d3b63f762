//! # Detection Module
//!
//! Runs the detection cycle (window → estimate → gate → note → evaluation)
//! and the periodic analysis worker that drives it.
//!
//! ## Threading
//! - The capture collaborator pushes chunks through a [`CaptureSink`]
//!   (bounded channel, never blocks).
//! - A dedicated worker thread owns the [`FrameAccumulator`]. On every tick
//!   it drains the queued chunks, analyses one window with the current
//!   config snapshot, appends accepted detections to the history and
//!   publishes the outcome.
//! - Config updates and history clears reach the worker as commands, so the
//!   history has a single writer. Readers take snapshots.

use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::audio::{BUFFER_SIZE, CaptureSink, FrameAccumulator};
use crate::config::TuningConfig;
use crate::error::{Result, TunerError};
use crate::history::{DetectionHistory, DetectionRecord};
use crate::note::NoteMapping;
use crate::pitch::{Algorithm, PitchEstimate, PitchEstimator};
use crate::tuning::{self, Rejection, TuningEvaluation};

/// Default cadence of the analysis worker.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Chunks the capture side may queue between two ticks.
const CAPTURE_QUEUE_CHUNKS: usize = 256;
/// Outcomes kept for a presentation layer that polls slowly.
const OUTCOME_QUEUE: usize = 16;

/// An accepted, evaluated detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub estimate: PitchEstimate,
    pub note: NoteMapping,
    pub evaluation: TuningEvaluation,
    pub timestamp: SystemTime,
}

impl Detection {
    pub fn to_record(&self) -> DetectionRecord {
        DetectionRecord {
            note: self.note.display_note.clone(),
            frequency: self.estimate.frequency,
            cents: self.note.cents_offset,
            confidence: self.estimate.confidence,
            timestamp: self.timestamp,
        }
    }
}

/// Result of one detection cycle.
pub type CycleOutcome = std::result::Result<Detection, Rejection>;

/// Runs one estimator call, turning a panic into "no detection".
pub fn estimate_window(algorithm: Algorithm, window: &[f32], sample_rate: u32) -> PitchEstimate {
    match panic::catch_unwind(AssertUnwindSafe(|| algorithm.estimate(window, sample_rate))) {
        Ok(estimate) => estimate,
        Err(_) => {
            warn!("{algorithm} estimator panicked, treating window as silent");
            PitchEstimate::NONE
        }
    }
}

/// One full detection cycle over a window, driven by a config snapshot.
pub fn analyze_window(window: &[f32], sample_rate: u32, config: &TuningConfig) -> CycleOutcome {
    let estimate = estimate_window(config.algorithm, window, sample_rate);
    let note = tuning::accept(&estimate, config)?;
    let evaluation = tuning::evaluate(note.cents_offset, estimate.confidence, config.tolerance_cents);
    Ok(Detection {
        estimate,
        note,
        evaluation,
        timestamp: SystemTime::now(),
    })
}

enum Command {
    UpdateConfig(TuningConfig),
    ClearHistory,
    Shutdown,
}

/// Handle to a running analysis worker.
///
/// Dropping the handle stops the worker without waiting for it.
pub struct Detector {
    sink: CaptureSink,
    commands: Sender<Command>,
    outcomes: Receiver<CycleOutcome>,
    history: Arc<RwLock<DetectionHistory>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Detector {
    /// Starts a worker ticking every [`TICK_INTERVAL`].
    pub fn spawn(config: TuningConfig, sample_rate: u32) -> Result<Self> {
        Self::spawn_with_interval(config, sample_rate, TICK_INTERVAL)
    }

    /// Starts a worker with a custom tick interval.
    ///
    /// # Errors
    /// * [`TunerError::InvalidConfig`] if the initial config does not validate
    /// * [`TunerError::WorkerSpawn`] if the thread cannot be created
    pub fn spawn_with_interval(
        config: TuningConfig,
        sample_rate: u32,
        interval: Duration,
    ) -> Result<Self> {
        config.validate()?;

        let (chunk_tx, chunk_rx) = crossbeam_channel::bounded(CAPTURE_QUEUE_CHUNKS);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (outcome_tx, outcome_rx) = crossbeam_channel::bounded(OUTCOME_QUEUE);
        let history = Arc::new(RwLock::new(DetectionHistory::new()));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            chunks: chunk_rx,
            commands: command_rx,
            outcomes: outcome_tx,
            overflow: outcome_rx.clone(),
            history: Arc::clone(&history),
            running: Arc::clone(&running),
            config,
            sample_rate,
            interval,
        };
        let handle = thread::Builder::new()
            .name("tuner-analysis".into())
            .spawn(move || worker.run())
            .map_err(|e| TunerError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            sink: CaptureSink::new(chunk_tx),
            commands: command_tx,
            outcomes: outcome_rx,
            history,
            running,
            worker: Some(handle),
        })
    }

    /// Sink the capture collaborator pushes audio into.
    pub fn capture_sink(&self) -> CaptureSink {
        self.sink.clone()
    }

    /// Replaces the config used from the next cycle on.
    ///
    /// # Errors
    /// * [`TunerError::InvalidConfig`] if the config does not validate
    /// * [`TunerError::WorkerStopped`] once the worker has been stopped
    pub fn update_config(&self, config: TuningConfig) -> Result<()> {
        config.validate()?;
        self.send(Command::UpdateConfig(config))
    }

    pub fn clear_history(&self) -> Result<()> {
        self.send(Command::ClearHistory)
    }

    fn send(&self, command: Command) -> Result<()> {
        if !self.is_running() {
            return Err(TunerError::WorkerStopped);
        }
        self.commands
            .send(command)
            .map_err(|_| TunerError::WorkerStopped)
    }

    /// Copy of the detection history, oldest first.
    pub fn history_snapshot(&self) -> Vec<DetectionRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Channel of cycle outcomes, for consumers that want to block or select.
    pub fn outcomes(&self) -> &Receiver<CycleOutcome> {
        &self.outcomes
    }

    /// Drains pending outcomes and returns the newest one.
    pub fn latest_outcome(&self) -> Option<CycleOutcome> {
        self.outcomes.try_iter().last()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops ticking immediately without waiting for the worker.
    ///
    /// A cycle already in flight finishes, but its outcome is discarded.
    pub fn stop(&mut self) {
        self.signal_stop();
        self.worker.take();
    }

    /// Stops the worker and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.signal_stop();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("analysis worker exited with a panic");
            }
        }
    }

    fn signal_stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("stopping analysis worker");
        }
        // The worker appends under this lock after re-checking the flag, so
        // once we have held it no further record can land.
        drop(self.history.write().unwrap_or_else(PoisonError::into_inner));
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// State owned by the analysis thread.
struct Worker {
    chunks: Receiver<Vec<f32>>,
    commands: Receiver<Command>,
    outcomes: Sender<CycleOutcome>,
    overflow: Receiver<CycleOutcome>,
    history: Arc<RwLock<DetectionHistory>>,
    running: Arc<AtomicBool>,
    config: TuningConfig,
    sample_rate: u32,
    interval: Duration,
}

impl Worker {
    fn run(mut self) {
        info!(
            "analysis worker started: {} Hz, tick {:?}, {}",
            self.sample_rate, self.interval, self.config.algorithm
        );
        let ticker = crossbeam_channel::tick(self.interval);
        let mut accumulator = FrameAccumulator::new(BUFFER_SIZE);

        loop {
            select! {
                recv(ticker) -> _ => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    for chunk in self.chunks.try_iter() {
                        accumulator.ingest(&chunk);
                    }
                    if let Some(window) = accumulator.take_window() {
                        if !self.cycle(&window) {
                            break;
                        }
                    } else {
                        trace!("waiting for a full window ({} samples)", accumulator.len());
                    }
                },
                recv(self.commands) -> command => match command {
                    Ok(Command::UpdateConfig(config)) => {
                        info!(
                            "config updated: A4={} Hz, ±{} cents, {}, guitar mode {} ({})",
                            config.reference_pitch,
                            config.tolerance_cents,
                            config.algorithm,
                            config.guitar_mode,
                            config.preset
                        );
                        self.config = config;
                    }
                    Ok(Command::ClearHistory) => {
                        self.history.write().unwrap_or_else(PoisonError::into_inner).clear();
                        debug!("detection history cleared");
                    }
                    Ok(Command::Shutdown) | Err(_) => break,
                },
            }
        }
        info!("analysis worker finished");
    }

    /// Analyses one window; returns `false` once the detector has stopped.
    fn cycle(&self, window: &[f32]) -> bool {
        let outcome = analyze_window(window, self.sample_rate, &self.config);

        if !self.running.load(Ordering::SeqCst) {
            debug!("detector stopped during analysis, discarding outcome");
            return false;
        }

        match &outcome {
            Ok(detection) => {
                trace!(
                    "{} {:.2} Hz {:+.1} cents ({:?})",
                    detection.note.display_note,
                    detection.estimate.frequency,
                    detection.note.cents_offset,
                    detection.evaluation.status
                );
                let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
                if !self.running.load(Ordering::SeqCst) {
                    debug!("detector stopped before append, discarding outcome");
                    return false;
                }
                history.append(detection.to_record());
            }
            Err(rejection) => debug!("estimate rejected: {rejection}"),
        }
        self.publish(outcome);
        true
    }

    /// Publishes an outcome, evicting the oldest queued one when full.
    fn publish(&self, outcome: CycleOutcome) {
        if let Err(TrySendError::Full(outcome)) = self.outcomes.try_send(outcome) {
            let _ = self.overflow.try_recv();
            let _ = self.outcomes.try_send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SAMPLE_RATE;
    use crate::pitch::tests::sine;
    use crate::tuning::{Direction, TuningPreset, TuningStatus};

    #[test]
    fn in_tune_string_is_accepted() {
        let detection =
            analyze_window(&sine(110.0, 0.5), SAMPLE_RATE, &TuningConfig::default()).unwrap();
        assert_eq!(detection.note.display_note, "A2");
        assert_eq!(detection.evaluation.status, TuningStatus::InTune);
        assert!(detection.estimate.confidence > 0.3);

        let record = detection.to_record();
        assert_eq!(record.note, "A2");
        assert_eq!(record.frequency, detection.estimate.frequency);
        assert_eq!(record.cents, detection.note.cents_offset);
    }

    #[test]
    fn sharp_string_is_classified_sharp() {
        // 25 cents above A2 with a 10 cent tolerance.
        let freq = 110.0 * 2.0_f32.powf(25.0 / 1200.0);
        let detection =
            analyze_window(&sine(freq, 0.5), SAMPLE_RATE, &TuningConfig::default()).unwrap();
        assert_eq!(detection.note.display_note, "A2");
        assert_eq!(
            detection.evaluation.status,
            TuningStatus::OutOfTune(Direction::Sharp)
        );
    }

    #[test]
    fn silence_is_rejected_as_no_pitch() {
        let outcome = analyze_window(&vec![0.0; BUFFER_SIZE], SAMPLE_RATE, &TuningConfig::default());
        assert_eq!(outcome, Err(Rejection::NoPitch));
    }

    #[test]
    fn guitar_mode_rejects_notes_outside_preset() {
        let config = TuningConfig {
            guitar_mode: true,
            preset: TuningPreset::Standard,
            ..TuningConfig::default()
        };
        let outcome = analyze_window(&sine(440.0, 0.5), SAMPLE_RATE, &config);
        assert_eq!(outcome, Err(Rejection::NotInPreset("A4".into())));
    }

    #[test]
    fn spectral_confidence_never_clears_the_floor() {
        let config = TuningConfig {
            algorithm: Algorithm::SpectralPeak,
            ..TuningConfig::default()
        };
        let outcome = analyze_window(&sine(440.0, 0.5), SAMPLE_RATE, &config);
        assert!(matches!(outcome, Err(Rejection::LowConfidence(_))));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn estimator_panic_counts_as_no_pitch() {
        // A short window trips the length assertion inside the estimator.
        let config = TuningConfig::default();
        assert_eq!(
            estimate_window(config.algorithm, &[0.5; 100], SAMPLE_RATE),
            PitchEstimate::NONE
        );
        assert_eq!(
            analyze_window(&[0.5; 100], SAMPLE_RATE, &config),
            Err(Rejection::NoPitch)
        );

        // The next cycle runs normally.
        let detection = analyze_window(&sine(110.0, 0.5), SAMPLE_RATE, &config).unwrap();
        assert_eq!(detection.note.display_note, "A2");
    }

    #[test]
    fn no_record_lands_after_stop_returns() {
        let tick = Duration::from_millis(1);
        let mut detector =
            Detector::spawn_with_interval(TuningConfig::default(), SAMPLE_RATE, tick).unwrap();
        let sink = detector.capture_sink();
        assert!(sink.push_samples(&sine(110.0, 0.5)));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while detector.history_snapshot().is_empty() {
            assert!(std::time::Instant::now() < deadline, "no detection before stop");
            thread::sleep(tick);
        }

        detector.stop();
        let frozen = detector.history_snapshot().len();
        for _ in 0..20 {
            thread::sleep(tick * 2);
            assert_eq!(detector.history_snapshot().len(), frozen);
        }
    }

    #[test]
    fn commands_fail_once_stopped() {
        let mut detector = Detector::spawn(TuningConfig::default(), SAMPLE_RATE).unwrap();
        assert_eq!(detector.clear_history(), Ok(()));
        detector.stop();
        assert_eq!(
            detector.update_config(TuningConfig::default()),
            Err(TunerError::WorkerStopped)
        );
        assert_eq!(detector.clear_history(), Err(TunerError::WorkerStopped));
    }

    #[test]
    fn invalid_config_refuses_to_spawn() {
        let config = TuningConfig {
            tolerance_cents: 0.0,
            ..TuningConfig::default()
        };
        assert!(matches!(
            Detector::spawn(config, SAMPLE_RATE),
            Err(TunerError::InvalidConfig(_))
        ));
    }
}
