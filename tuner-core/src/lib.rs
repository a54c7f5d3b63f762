// tuner-core/src/lib.rs

//! The core logic for the instrument tuner.
//! This crate is responsible for frame buffering, pitch detection,
//! note mapping, tuning evaluation and the detection history. It is
//! completely headless: audio capture, settings storage and display
//! live in the front end, which pushes PCM in and reads typed results out.

pub mod audio;
pub mod config;
pub mod detector;
pub mod error;
pub mod history;
pub mod note;
pub mod pitch;
pub mod tuning;

pub use audio::{BUFFER_SIZE, CaptureSink, FrameAccumulator, SAMPLE_RATE};
pub use config::TuningConfig;
pub use detector::{CycleOutcome, Detection, Detector, analyze_window};
pub use error::{Result, TunerError};
pub use history::{DetectionHistory, DetectionRecord};
pub use note::{NoteMapping, map_frequency_to_note};
pub use pitch::{Algorithm, PitchEstimate, PitchEstimator};
pub use tuning::{Direction, Indicator, Rejection, TuningEvaluation, TuningPreset, TuningStatus};
