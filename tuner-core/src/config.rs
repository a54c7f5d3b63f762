//! Tuning configuration snapshot.
//!
//! The configuration store owns the live settings; the analysis worker only
//! ever sees an immutable copy, replaced wholesale between detection cycles.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};
use crate::pitch::Algorithm;
use crate::tuning::TuningPreset;

pub const DEFAULT_REFERENCE_PITCH: f32 = 440.0;
pub const DEFAULT_TOLERANCE_CENTS: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TuningConfig {
    /// Frequency of A4 in Hz.
    pub reference_pitch: f32,
    /// Half-width of the in-tune band, in cents.
    pub tolerance_cents: f32,
    /// Only accept notes that belong to `preset`.
    pub guitar_mode: bool,
    pub preset: TuningPreset,
    pub algorithm: Algorithm,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            reference_pitch: DEFAULT_REFERENCE_PITCH,
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
            guitar_mode: false,
            preset: TuningPreset::default(),
            algorithm: Algorithm::default(),
        }
    }
}

impl TuningConfig {
    /// Checks that the numeric settings are usable.
    ///
    /// # Errors
    /// * [`TunerError::InvalidConfig`] for a non-positive or non-finite
    ///   reference pitch or tolerance
    pub fn validate(&self) -> Result<()> {
        if !(self.reference_pitch.is_finite() && self.reference_pitch > 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "reference pitch must be a positive frequency, got {}",
                self.reference_pitch
            )));
        }
        if !(self.tolerance_cents.is_finite() && self.tolerance_cents > 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "tolerance must be a positive number of cents, got {}",
                self.tolerance_cents
            )));
        }
        Ok(())
    }

    /// Returns the config if it validates.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TuningConfig::default();
        assert_eq!(config.reference_pitch, 440.0);
        assert_eq!(config.tolerance_cents, 10.0);
        assert!(!config.guitar_mode);
        assert_eq!(config.preset, TuningPreset::Standard);
        assert_eq!(config.algorithm, Algorithm::TimeDomain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_numbers() {
        let bad = [
            TuningConfig {
                reference_pitch: 0.0,
                ..TuningConfig::default()
            },
            TuningConfig {
                reference_pitch: f32::NAN,
                ..TuningConfig::default()
            },
            TuningConfig {
                tolerance_cents: 0.0,
                ..TuningConfig::default()
            },
            TuningConfig {
                tolerance_cents: -5.0,
                ..TuningConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(TunerError::InvalidConfig(_))));
        }
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: TuningConfig = serde_json::from_str(
            r#"{ "referencePitch": 442.0, "guitarMode": true, "preset": "Drop D" }"#,
        )
        .unwrap();
        assert_eq!(config.reference_pitch, 442.0);
        assert!(config.guitar_mode);
        assert_eq!(config.preset, TuningPreset::DropD);
        assert_eq!(config.tolerance_cents, DEFAULT_TOLERANCE_CENTS);
        assert_eq!(config.algorithm, Algorithm::TimeDomain);
    }

    #[test]
    fn json_round_trip_uses_display_names() {
        let config = TuningConfig {
            preset: TuningPreset::OpenG,
            algorithm: Algorithm::Autocorrelation,
            ..TuningConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""preset":"Open G""#));
        assert!(json.contains(r#""algorithm":"Autocorrelation""#));
        let back: TuningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
