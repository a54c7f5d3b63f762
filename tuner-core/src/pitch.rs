//! # Pitch Detection Module
//!
//! This module implements the fundamental-frequency estimators used by the
//! tuner. Every estimator maps one analysis window to a [`PitchEstimate`] and
//! never fails: silence, noise and degenerate input all come back as
//! [`PitchEstimate::NONE`].
//!
//! ## Estimators
//! - [`TimeDomainEstimator`]: cumulative-mean-normalized difference (YIN
//!   style) with an absolute threshold and parabolic interpolation. This is
//!   the recommended estimator.
//! - [`AutocorrelationEstimator`]: strongest autocorrelation peak inside the
//!   detectable lag band, refined to a fractional lag.
//! - [`SpectralPeakEstimator`]: coarse, decimated DFT peak picking. Kept as a
//!   low-cost fallback; its confidence is deliberately scaled down by 100 and
//!   is not comparable to the other two.
//!
//! [`Algorithm`] is the closed set of estimators selectable from
//! configuration.

use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audio::BUFFER_SIZE;
use crate::error::TunerError;

/// Lowest frequency the estimators search for, in Hz.
pub const MIN_FREQUENCY: f32 = 80.0;
/// Highest frequency the estimators search for, in Hz.
pub const MAX_FREQUENCY: f32 = 2000.0;

/// Result of one estimator call.
///
/// `frequency == 0` or `confidence == 0` means nothing was detected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f32,
    /// Estimator-specific certainty in `[0, 1]`.
    pub confidence: f32,
}

impl PitchEstimate {
    /// The "no detection" sentinel.
    pub const NONE: Self = Self {
        frequency: 0.0,
        confidence: 0.0,
    };

    pub fn is_detection(&self) -> bool {
        self.frequency > 0.0 && self.confidence > 0.0
    }
}

/// Common capability of every pitch estimator.
///
/// Implementations are pure: no internal state is carried between calls.
pub trait PitchEstimator {
    /// Estimates the fundamental of `window`, which must hold exactly
    /// [`BUFFER_SIZE`] samples.
    fn estimate(&self, window: &[f32], sample_rate: u32) -> PitchEstimate;
}

/// Rejects windows of the wrong length and constant windows (silence or DC).
///
/// A wrong length is a caller bug: it panics in debug builds and yields the
/// sentinel in release builds.
fn usable_window(window: &[f32], sample_rate: u32) -> bool {
    debug_assert_eq!(
        window.len(),
        BUFFER_SIZE,
        "analysis window must hold exactly BUFFER_SIZE samples"
    );
    window.len() == BUFFER_SIZE
        && sample_rate > 0
        && window.iter().any(|&s| s != window[0])
}

/// Time-domain difference method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDomainEstimator {
    /// Absolute threshold on the normalized difference function.
    pub threshold: f32,
}

impl Default for TimeDomainEstimator {
    fn default() -> Self {
        Self { threshold: 0.1 }
    }
}

impl PitchEstimator for TimeDomainEstimator {
    fn estimate(&self, window: &[f32], sample_rate: u32) -> PitchEstimate {
        if !usable_window(window, sample_rate) {
            return PitchEstimate::NONE;
        }

        let half = window.len() / 2;
        let head = &window[..half];

        // --- Squared difference function ---
        let mut yin_buffer = vec![0.0f32; half];
        for (tau, slot) in yin_buffer.iter_mut().enumerate().skip(1) {
            *slot = head
                .iter()
                .zip(&window[tau..tau + half])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
        }

        // --- Cumulative mean normalized difference ---
        // A non-positive running sum leaves the raw difference in place.
        yin_buffer[0] = 1.0;
        let mut running_sum = 0.0f32;
        for (tau, slot) in yin_buffer.iter_mut().enumerate().skip(1) {
            running_sum += *slot;
            if running_sum > 0.0 {
                *slot *= tau as f32 / running_sum;
            }
        }

        // --- First dip under the absolute threshold, settled on its minimum ---
        let Some(mut tau) = (1..half).find(|&t| yin_buffer[t] < self.threshold) else {
            return PitchEstimate::NONE;
        };
        while tau + 1 < half && yin_buffer[tau + 1] < yin_buffer[tau] {
            tau += 1;
        }
        let confidence = (1.0 - yin_buffer[tau]).clamp(0.0, 1.0);

        // --- Parabolic interpolation for sub-sample accuracy ---
        let better_tau = if tau + 1 < half {
            let s0 = yin_buffer[tau - 1];
            let s1 = yin_buffer[tau];
            let s2 = yin_buffer[tau + 1];
            let denominator = 2.0 * (s0 - 2.0 * s1 + s2);
            if denominator.abs() < 1e-10 {
                tau as f32
            } else {
                tau as f32 + (s0 - s2) / denominator
            }
        } else {
            tau as f32
        };

        let frequency = sample_rate as f32 / better_tau;
        if frequency.is_finite() && frequency > 0.0 {
            PitchEstimate {
                frequency,
                confidence,
            }
        } else {
            PitchEstimate::NONE
        }
    }
}

/// Unnormalized autocorrelation peak picking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AutocorrelationEstimator;

impl PitchEstimator for AutocorrelationEstimator {
    fn estimate(&self, window: &[f32], sample_rate: u32) -> PitchEstimate {
        if !usable_window(window, sample_rate) {
            return PitchEstimate::NONE;
        }

        let n = window.len();
        let sr = sample_rate as f32;
        let min_lag = ((sr / MAX_FREQUENCY).round() as usize).max(1);
        // One extra lag on the right is needed to recognize a local peak.
        let max_lag = ((sr / MIN_FREQUENCY).round() as usize).min(n - 2);
        if min_lag >= max_lag {
            return PitchEstimate::NONE;
        }

        let r = |lag: usize| -> f32 {
            window[..n - lag]
                .iter()
                .zip(&window[lag..])
                .map(|(a, b)| a * b)
                .sum()
        };

        let energy = r(0);
        if energy <= 0.0 || !energy.is_finite() {
            return PitchEstimate::NONE;
        }

        // corr[i] holds r(min_lag - 1 + i)
        let corr: Vec<f32> = (min_lag - 1..=max_lag + 1).map(r).collect();

        let mut peak_lag = 0;
        let mut peak_value = 0.0f32;
        for lag in min_lag..=max_lag {
            let i = lag + 1 - min_lag;
            let value = corr[i];
            let is_local_peak = value > corr[i - 1] && value >= corr[i + 1];
            if is_local_peak && value > peak_value {
                peak_lag = lag;
                peak_value = value;
            }
        }

        if peak_lag == 0 {
            return PitchEstimate::NONE;
        }

        // Parabolic refinement around the peak; integer lags alone are
        // more than 1% coarse near the top of the band.
        let i = peak_lag + 1 - min_lag;
        let (s0, s1, s2) = (corr[i - 1], corr[i], corr[i + 1]);
        let denominator = 2.0 * (s0 - 2.0 * s1 + s2);
        let better_lag = if denominator.abs() < 1e-10 {
            peak_lag as f32
        } else {
            peak_lag as f32 + ((s0 - s2) / denominator).clamp(-0.5, 0.5)
        };

        PitchEstimate {
            frequency: sr / better_lag,
            confidence: (peak_value / energy).clamp(0.0, 1.0),
        }
    }
}

/// Reduced-cost spectral peak picking.
///
/// Only every fourth bin is evaluated, over every second sample, so the
/// frequency grid is about 43 Hz wide at 44.1 kHz. Expect a few percent of
/// error below ~400 Hz.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralPeakEstimator;

impl SpectralPeakEstimator {
    const BIN_STEP: usize = 4;
    const SAMPLE_STEP: usize = 2;
    const CONFIDENCE_SCALE: f32 = 100.0;

    /// Magnitudes of the evaluated bins; bins that are skipped stay zero.
    fn magnitudes(window: &[f32]) -> Vec<f32> {
        let n = window.len();
        let twiddles: Vec<(f32, f32)> = (0..n)
            .map(|j| {
                let angle = -TAU * j as f32 / n as f32;
                (angle.cos(), angle.sin())
            })
            .collect();

        let mut magnitudes = vec![0.0f32; n / 2];
        for k in (1..n / 2).step_by(Self::BIN_STEP) {
            let (mut real, mut imag) = (0.0f32, 0.0f32);
            for idx in (0..n).step_by(Self::SAMPLE_STEP) {
                let (cos, sin) = twiddles[(k * idx) % n];
                real += window[idx] * cos;
                imag += window[idx] * sin;
            }
            magnitudes[k] = (real * real + imag * imag).sqrt();
        }
        magnitudes
    }
}

impl PitchEstimator for SpectralPeakEstimator {
    fn estimate(&self, window: &[f32], sample_rate: u32) -> PitchEstimate {
        if !usable_window(window, sample_rate) {
            return PitchEstimate::NONE;
        }

        let n = window.len();
        let sr = sample_rate as f32;
        let magnitudes = Self::magnitudes(window);

        let low_bin = (MIN_FREQUENCY * n as f32 / sr).ceil() as usize;
        let high_bin = ((MAX_FREQUENCY * n as f32 / sr).floor() as usize).min(n / 2 - 1);

        let mut peak_bin = 0;
        let mut peak_magnitude = 0.0f32;
        for (k, &m) in magnitudes
            .iter()
            .enumerate()
            .take(high_bin + 1)
            .skip(low_bin)
        {
            if m > peak_magnitude {
                peak_bin = k;
                peak_magnitude = m;
            }
        }
        if peak_bin == 0 {
            return PitchEstimate::NONE;
        }

        let (sum, count) = magnitudes
            .iter()
            .filter(|&&m| m > 0.0)
            .fold((0.0f32, 0usize), |(s, c), &m| (s + m, c + 1));
        if count == 0 {
            return PitchEstimate::NONE;
        }
        let mean = sum / count as f32;

        PitchEstimate {
            frequency: peak_bin as f32 * sr / n as f32,
            confidence: (peak_magnitude / mean).clamp(0.0, 1.0) / Self::CONFIDENCE_SCALE,
        }
    }
}

/// The estimators selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    #[default]
    TimeDomain,
    Autocorrelation,
    SpectralPeak,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::TimeDomain,
        Algorithm::Autocorrelation,
        Algorithm::SpectralPeak,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::TimeDomain => "TimeDomain",
            Algorithm::Autocorrelation => "Autocorrelation",
            Algorithm::SpectralPeak => "SpectralPeak",
        }
    }
}

impl PitchEstimator for Algorithm {
    fn estimate(&self, window: &[f32], sample_rate: u32) -> PitchEstimate {
        match self {
            Algorithm::TimeDomain => TimeDomainEstimator::default().estimate(window, sample_rate),
            Algorithm::Autocorrelation => AutocorrelationEstimator.estimate(window, sample_rate),
            Algorithm::SpectralPeak => SpectralPeakEstimator.estimate(window, sample_rate),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = TunerError;

    /// Accepts the variant names case-insensitively, ignoring `-`, `_` and
    /// spaces, plus the short forms `yin`, `acf` and `fft`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "timedomain" | "yin" => Ok(Algorithm::TimeDomain),
            "autocorrelation" | "acf" => Ok(Algorithm::Autocorrelation),
            "spectralpeak" | "spectral" | "fft" => Ok(Algorithm::SpectralPeak),
            _ => Err(TunerError::UnknownAlgorithm(s.to_string())),
        }
    }
}
