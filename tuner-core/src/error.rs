//! Error type shared by the tuner core.
//!
//! "No pitch detected" is not an error here: estimators return
//! [`PitchEstimate::NONE`](crate::pitch::PitchEstimate::NONE) and the
//! acceptance gate reports a [`Rejection`](crate::tuning::Rejection).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TunerError {
    /// A configuration value is out of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown tuning preset '{0}'")]
    UnknownPreset(String),

    #[error("unknown pitch detection algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// 16-bit PCM payloads must hold an even number of bytes.
    #[error("PCM payload has odd length {0}")]
    OddPcmLength(usize),

    #[error("cannot parse note name '{0}'")]
    InvalidNote(String),

    #[error("failed to start analysis worker: {0}")]
    WorkerSpawn(String),

    /// The analysis worker was stopped or has exited.
    #[error("analysis worker is not running")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, TunerError>;
