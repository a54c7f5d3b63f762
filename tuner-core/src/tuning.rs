//! # Tuning Evaluation Module
//!
//! Decides whether a pitch estimate is worth showing and how far it is from
//! being in tune.
//!
//! ## Features
//! - Acceptance gate on frequency range and confidence
//! - Guitar mode: only notes of the selected preset are accepted
//! - Three-band classification (in tune / slightly off / out of tune) with a
//!   sharp or flat direction
//! - Registry of six-string guitar tuning presets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::TuningConfig;
use crate::error::TunerError;
use crate::note::{self, NoteMapping};
use crate::pitch::PitchEstimate;

/// Estimates at or below this frequency are rejected, in Hz.
pub const MIN_ACCEPTED_FREQUENCY: f32 = 70.0;
/// Estimates at or above this frequency are rejected, in Hz.
pub const MAX_ACCEPTED_FREQUENCY: f32 = 2000.0;
/// Estimates at or below this confidence are rejected.
pub const CONFIDENCE_FLOOR: f32 = 0.3;

/// A named open-string tuning for a six-string guitar, low string first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TuningPreset {
    #[default]
    Standard,
    #[serde(rename = "Drop D", alias = "DropD")]
    DropD,
    #[serde(rename = "Open G", alias = "OpenG")]
    OpenG,
    #[serde(rename = "DADGAD", alias = "Dadgad")]
    Dadgad,
}

impl TuningPreset {
    pub const ALL: [TuningPreset; 4] = [
        TuningPreset::Standard,
        TuningPreset::DropD,
        TuningPreset::OpenG,
        TuningPreset::Dadgad,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TuningPreset::Standard => "Standard",
            TuningPreset::DropD => "Drop D",
            TuningPreset::OpenG => "Open G",
            TuningPreset::Dadgad => "DADGAD",
        }
    }

    pub fn notes(&self) -> &'static [&'static str; 6] {
        match self {
            TuningPreset::Standard => &["E2", "A2", "D3", "G3", "B3", "E4"],
            TuningPreset::DropD => &["D2", "A2", "D3", "G3", "B3", "E4"],
            TuningPreset::OpenG => &["D2", "G2", "D3", "G3", "B3", "D4"],
            TuningPreset::Dadgad => &["D2", "A2", "D3", "G3", "A3", "D4"],
        }
    }

    /// Exact match on the display note (pitch class and octave).
    pub fn contains(&self, display_note: &str) -> bool {
        self.notes().contains(&display_note)
    }

    /// Target frequency of each string for the given A4 reference.
    pub fn target_frequencies(&self, reference_pitch: f32) -> [f32; 6] {
        self.notes().map(|name| {
            // Preset tables only hold well-formed names.
            note::note_frequency(name, reference_pitch).unwrap_or_default()
        })
    }
}

impl fmt::Display for TuningPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TuningPreset {
    type Err = TunerError;

    /// Looks a preset up by name, ignoring case, spaces, `-` and `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = |name: &str| -> String {
            name.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect()
        };
        let wanted = key(s);
        TuningPreset::ALL
            .into_iter()
            .find(|preset| key(preset.name()) == wanted)
            .ok_or_else(|| TunerError::UnknownPreset(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Sharp,
    Flat,
}

impl Direction {
    /// Zero counts as flat.
    pub fn of(cents: f32) -> Self {
        if cents > 0.0 {
            Direction::Sharp
        } else {
            Direction::Flat
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TuningStatus {
    NoSignal,
    InTune,
    SlightlyOff(Direction),
    OutOfTune(Direction),
}

/// Traffic-light band a front end can paint a status with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indicator {
    Off,
    Green,
    Amber,
    Red,
}

impl TuningStatus {
    pub fn indicator(&self) -> Indicator {
        match self {
            TuningStatus::NoSignal => Indicator::Off,
            TuningStatus::InTune => Indicator::Green,
            TuningStatus::SlightlyOff(_) => Indicator::Amber,
            TuningStatus::OutOfTune(_) => Indicator::Red,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            TuningStatus::SlightlyOff(d) | TuningStatus::OutOfTune(d) => Some(*d),
            TuningStatus::NoSignal | TuningStatus::InTune => None,
        }
    }
}

/// Classification of one accepted detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TuningEvaluation {
    pub status: TuningStatus,
    pub cents_offset: f32,
    pub direction: Direction,
}

/// Classifies a cent offset against a tolerance.
///
/// Low confidence always yields [`TuningStatus::NoSignal`], which also covers
/// replays of stored records that never went through the gate.
pub fn classify(cents: f32, confidence: f32, tolerance_cents: f32) -> TuningStatus {
    if confidence < CONFIDENCE_FLOOR {
        return TuningStatus::NoSignal;
    }
    let deviation = cents.abs();
    if deviation < tolerance_cents {
        TuningStatus::InTune
    } else if deviation < 2.0 * tolerance_cents {
        TuningStatus::SlightlyOff(Direction::of(cents))
    } else {
        TuningStatus::OutOfTune(Direction::of(cents))
    }
}

pub fn evaluate(cents: f32, confidence: f32, tolerance_cents: f32) -> TuningEvaluation {
    TuningEvaluation {
        status: classify(cents, confidence, tolerance_cents),
        cents_offset: cents,
        direction: Direction::of(cents),
    }
}

/// Why an estimate was not turned into a detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The estimator reported nothing.
    NoPitch,
    OutOfRange(f32),
    LowConfidence(f32),
    /// Guitar mode is on and the note is not a string of the preset.
    NotInPreset(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoPitch => write!(f, "no pitch"),
            Rejection::OutOfRange(freq) => write!(f, "{freq:.1} Hz out of range"),
            Rejection::LowConfidence(conf) => write!(f, "confidence {conf:.2} too low"),
            Rejection::NotInPreset(note) => write!(f, "{note} is not in the preset"),
        }
    }
}

/// Range and confidence gate applied to every raw estimate.
pub fn gate(estimate: &PitchEstimate) -> Result<(), Rejection> {
    if !estimate.is_detection() {
        return Err(Rejection::NoPitch);
    }
    let f = estimate.frequency;
    if !(f > MIN_ACCEPTED_FREQUENCY && f < MAX_ACCEPTED_FREQUENCY) {
        return Err(Rejection::OutOfRange(f));
    }
    if estimate.confidence <= CONFIDENCE_FLOOR {
        return Err(Rejection::LowConfidence(estimate.confidence));
    }
    Ok(())
}

/// Gates an estimate, maps it to a note and applies the guitar-mode filter.
pub fn accept(estimate: &PitchEstimate, config: &TuningConfig) -> Result<NoteMapping, Rejection> {
    gate(estimate)?;
    let mapping = note::map_frequency_to_note(estimate.frequency, config.reference_pitch)
        .ok_or(Rejection::NoPitch)?;
    if config.guitar_mode && !config.preset.contains(&mapping.display_note) {
        return Err(Rejection::NotInPreset(mapping.display_note));
    }
    Ok(mapping)
}
