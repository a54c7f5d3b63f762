//! # Note Mapping Module
//!
//! Equal-tempered 12-tone mapping between frequencies and note names.
//!
//! Notes are numbered in semitones from C0, so A4 is semitone 57 and the
//! octave of a note is `semitone / 12` (floored). The reference pitch is the
//! frequency of A4.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Result, TunerError};

/// Pitch classes in semitone order starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Semitone index of A4 counted from C0.
pub const A4_SEMITONE: i32 = 57;

/// Pitch class spellings accepted when parsing note names, flats included.
static PITCH_CLASS_INDEX: Lazy<BTreeMap<&'static str, i32>> = Lazy::new(|| {
    const FLATS: [(&str, i32); 7] = [
        ("Cb", -1),
        ("Db", 1),
        ("Eb", 3),
        ("Fb", 4),
        ("Gb", 6),
        ("Ab", 8),
        ("Bb", 10),
    ];
    NOTE_NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| (name, i as i32))
        .chain(FLATS)
        .collect()
});

/// A frequency expressed as the nearest equal-tempered note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteMapping {
    /// Pitch class, one of [`NOTE_NAMES`].
    pub note_name: &'static str,
    pub octave: i32,
    /// Deviation from the nearest note, in `[-50, 50]` cents.
    pub cents_offset: f32,
    /// Pitch class followed by octave, e.g. `"E2"`.
    pub display_note: String,
}

/// Continuous semitone position of `frequency` counted from C0.
pub fn note_number(frequency: f32, reference_pitch: f32) -> f32 {
    12.0 * (frequency / reference_pitch).log2() + A4_SEMITONE as f32
}

/// Maps a frequency to its nearest note and cent offset.
///
/// # Returns
/// * `None` if `frequency` or `reference_pitch` is not a positive finite value
pub fn map_frequency_to_note(frequency: f32, reference_pitch: f32) -> Option<NoteMapping> {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if !valid(frequency) || !valid(reference_pitch) {
        return None;
    }

    let number = note_number(frequency, reference_pitch);
    let rounded = number.round();
    let cents_offset = (number - rounded) * 100.0;

    let semitone = rounded as i32;
    let note_name = NOTE_NAMES[semitone.rem_euclid(12) as usize];
    let octave = semitone.div_euclid(12);

    Some(NoteMapping {
        note_name,
        octave,
        cents_offset,
        display_note: format!("{note_name}{octave}"),
    })
}

/// Parses a display note such as `"E2"`, `"C#4"` or `"Bb-1"` into its
/// semitone index from C0.
pub fn parse_note(name: &str) -> Result<i32> {
    let invalid = || TunerError::InvalidNote(name.to_string());
    let trimmed = name.trim();

    let split = trimmed
        .find(|c: char| c == '-' || c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (class, octave) = trimmed.split_at(split);

    let class_index = *PITCH_CLASS_INDEX.get(class).ok_or_else(invalid)?;
    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    Ok(octave * 12 + class_index)
}

/// Equal-tempered frequency of a display note for the given A4 reference.
///
/// # Errors
/// * [`TunerError::InvalidNote`] if the name cannot be parsed
pub fn note_frequency(name: &str, reference_pitch: f32) -> Result<f32> {
    let semitone = parse_note(name)?;
    Ok(reference_pitch * 2.0_f32.powf((semitone - A4_SEMITONE) as f32 / 12.0))
}
