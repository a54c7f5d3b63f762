//! Drives the threaded detector the way a capture callback and a UI would.

use std::thread;
use std::time::{Duration, Instant};

use tuner_core::{
    CaptureSink, Detector, Rejection, SAMPLE_RATE, TuningConfig, TuningStatus,
};

const TICK: Duration = Duration::from_millis(10);
const PATIENCE: Duration = Duration::from_secs(10);

/// Pushes `seconds` of a sine as 16-bit PCM in 1024-sample chunks.
///
/// Returns `false` if the worker was gone for any chunk.
fn push_sine(sink: &CaptureSink, frequency: f64, seconds: f64) -> bool {
    let total = (SAMPLE_RATE as f64 * seconds) as usize;
    let pcm: Vec<i16> = (0..total)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            (0.5 * (std::f64::consts::TAU * frequency * t).sin() * i16::MAX as f64) as i16
        })
        .collect();
    pcm.chunks(1024).all(|chunk| sink.push_i16(chunk))
}

fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(start.elapsed() < PATIENCE, "timed out waiting for the detector");
        thread::sleep(TICK);
    }
}

#[test]
fn detects_pushed_tone_and_records_history() {
    let detector = Detector::spawn_with_interval(TuningConfig::default(), SAMPLE_RATE, TICK)
        .expect("detector starts");
    assert!(push_sine(&detector.capture_sink(), 110.0, 0.2));

    let detection = wait_for(|| match detector.outcomes().recv_timeout(TICK) {
        Ok(Ok(detection)) => Some(detection),
        _ => None,
    });
    assert_eq!(detection.note.display_note, "A2");
    assert_eq!(detection.evaluation.status, TuningStatus::InTune);

    let history = wait_for(|| {
        let snapshot = detector.history_snapshot();
        (!snapshot.is_empty()).then_some(snapshot)
    });
    assert!(history.iter().all(|r| r.note == "A2"));
    assert!(history.len() <= 100);

    detector.shutdown();
}

#[test]
fn config_updates_and_clear_apply_between_cycles() {
    let detector = Detector::spawn_with_interval(TuningConfig::default(), SAMPLE_RATE, TICK)
        .expect("detector starts");
    assert!(push_sine(&detector.capture_sink(), 440.0, 0.2));

    wait_for(|| (!detector.history_snapshot().is_empty()).then_some(()));

    // A4 is not a string of the standard guitar tuning.
    detector
        .update_config(TuningConfig {
            guitar_mode: true,
            ..TuningConfig::default()
        })
        .unwrap();
    detector.clear_history().unwrap();

    wait_for(|| match detector.outcomes().recv_timeout(TICK) {
        Ok(Err(Rejection::NotInPreset(note))) => Some(note),
        _ => None,
    });
    thread::sleep(TICK * 5);
    assert!(detector.history_snapshot().is_empty());

    assert!(
        detector
            .update_config(TuningConfig {
                reference_pitch: -1.0,
                ..TuningConfig::default()
            })
            .is_err()
    );

    detector.shutdown();
}

#[test]
fn stopping_halts_history_growth() {
    let mut detector = Detector::spawn_with_interval(TuningConfig::default(), SAMPLE_RATE, TICK)
        .expect("detector starts");
    let sink = detector.capture_sink();
    assert!(push_sine(&sink, 220.0, 0.2));
    wait_for(|| (!detector.history_snapshot().is_empty()).then_some(()));

    detector.stop();
    assert!(!detector.is_running());

    // Let any in-flight cycle finish, then make sure nothing else lands.
    thread::sleep(Duration::from_millis(500));
    let settled = detector.history_snapshot().len();
    // The worker has exited, so the sink reports it as gone.
    assert!(!push_sine(&sink, 220.0, 0.1));
    thread::sleep(TICK * 20);
    assert_eq!(detector.history_snapshot().len(), settled);
}
