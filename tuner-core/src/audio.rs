//! # Audio Input Module
//!
//! This module is the boundary between the audio capture collaborator and the
//! analysis pipeline. It decodes 16-bit PCM into normalized samples, queues
//! incoming chunks for the analysis worker, and maintains the sliding window
//! that estimators read from.
//!
//! ## Features
//! - Little-endian 16-bit PCM decoding (`raw / 32768.0`)
//! - Non-blocking, cloneable capture sink backed by a bounded channel
//! - Frame accumulator with a bounded backlog of `2 * BUFFER_SIZE` samples

use crossbeam_channel::{Sender, TrySendError};
use log::{trace, warn};

use crate::error::{Result, TunerError};

/// Number of samples handed to one estimator call.
///
/// At 44.1 kHz this is ~93 ms of audio, enough for a few periods of the low
/// E string (82.4 Hz) at the time-domain estimator's maximum lag of
/// `BUFFER_SIZE / 2`.
pub const BUFFER_SIZE: usize = 4096;

/// Sample rate the capture collaborator delivers, in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Scale factor from signed 16-bit PCM to `[-1.0, 1.0)`.
const PCM_SCALE: f32 = 32768.0;

/// Converts one signed 16-bit PCM value to a normalized sample.
#[inline]
pub fn sample_from_i16(raw: i16) -> f32 {
    raw as f32 / PCM_SCALE
}

/// Converts a slice of signed 16-bit PCM values to normalized samples.
pub fn samples_from_i16(raw: &[i16]) -> Vec<f32> {
    raw.iter().copied().map(sample_from_i16).collect()
}

/// Decodes a little-endian 16-bit mono PCM payload.
///
/// # Errors
/// * [`TunerError::OddPcmLength`] if the payload does not hold whole samples
pub fn decode_pcm_le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(TunerError::OddPcmLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| sample_from_i16(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Accumulates incoming chunks and exposes fixed-size analysis windows.
///
/// The backlog never exceeds `2 * window_size` samples; when an ingest pushes
/// it past that bound, only the most recent `window_size` samples are kept.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    buffer: Vec<f32>,
    window_size: usize,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(BUFFER_SIZE)
    }
}

impl FrameAccumulator {
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(window_size * 2),
            window_size,
        }
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a chunk, then trims the backlog from the front.
    pub fn ingest(&mut self, chunk: &[f32]) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > self.window_size * 2 {
            let excess = self.buffer.len() - self.window_size;
            self.buffer.drain(..excess);
            trace!("accumulator trimmed {} stale samples", excess);
        }
    }

    pub fn has_full_window(&self) -> bool {
        self.buffer.len() >= self.window_size
    }

    /// Copies the oldest `window_size` samples without consuming them.
    ///
    /// Returns `None` until a full window has been accumulated.
    pub fn take_window(&self) -> Option<Vec<f32>> {
        if !self.has_full_window() {
            return None;
        }
        Some(self.buffer[..self.window_size].to_vec())
    }
}

/// Push interface the capture collaborator uses to feed the analysis worker.
///
/// Cloning is cheap; every clone feeds the same worker. Pushing never blocks:
/// when the worker falls behind, whole chunks are dropped.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    sender: Sender<Vec<f32>>,
}

impl CaptureSink {
    pub(crate) fn new(sender: Sender<Vec<f32>>) -> Self {
        Self { sender }
    }

    /// Queues already-normalized samples.
    ///
    /// Returns `false` once the receiving worker has gone away.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }
        if let Some(bad) = samples.iter().find(|s| !s.is_finite()) {
            warn!("dropping chunk with non-finite sample: {bad}");
            return true;
        }
        self.send(samples.to_vec())
    }

    /// Queues signed 16-bit PCM samples.
    pub fn push_i16(&self, raw: &[i16]) -> bool {
        if raw.is_empty() {
            return true;
        }
        self.send(samples_from_i16(raw))
    }

    /// Queues a little-endian 16-bit PCM payload.
    ///
    /// # Errors
    /// * [`TunerError::OddPcmLength`] if the payload does not hold whole samples
    pub fn push_pcm_le(&self, bytes: &[u8]) -> Result<bool> {
        let samples = decode_pcm_le(bytes)?;
        if samples.is_empty() {
            return Ok(true);
        }
        Ok(self.send(samples))
    }

    fn send(&self, chunk: Vec<f32>) -> bool {
        match self.sender.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(chunk)) => {
                warn!("capture queue full, dropping {} samples", chunk.len());
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_trims_to_most_recent_window() {
        let mut acc = FrameAccumulator::new(BUFFER_SIZE);
        let total = BUFFER_SIZE * 5 / 2;
        let samples: Vec<f32> = (0..total).map(|i| i as f32).collect();

        for chunk in samples.chunks(BUFFER_SIZE / 2) {
            acc.ingest(chunk);
            assert!(acc.len() <= BUFFER_SIZE * 2);
        }

        assert_eq!(acc.len(), BUFFER_SIZE);
        let window = acc.take_window().unwrap();
        assert_eq!(window.as_slice(), &samples[total - BUFFER_SIZE..]);
    }

    #[test]
    fn backlog_may_reach_twice_the_window() {
        let mut acc = FrameAccumulator::new(8);
        acc.ingest(&[0.1; 16]);
        assert_eq!(acc.len(), 16);
        acc.ingest(&[0.2]);
        assert_eq!(acc.len(), 8);
    }

    #[test]
    fn take_window_is_idempotent_and_non_consuming() {
        let mut acc = FrameAccumulator::new(4);
        acc.ingest(&[0.1, 0.2, 0.3]);
        assert!(!acc.has_full_window());
        assert!(acc.take_window().is_none());

        acc.ingest(&[0.4, 0.5]);
        assert!(acc.has_full_window());
        let first = acc.take_window().unwrap();
        let second = acc.take_window().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(acc.len(), 5);
    }

    #[test]
    fn empty_chunk_is_noop() {
        let mut acc = FrameAccumulator::default();
        acc.ingest(&[]);
        assert!(acc.is_empty());
    }

    #[test]
    fn pcm_decoding_normalizes_little_endian() {
        let bytes = [0x00, 0x80, 0x00, 0x40, 0xff, 0x7f, 0x00, 0x00];
        let samples = decode_pcm_le(&bytes).unwrap();
        assert_eq!(samples, vec![-1.0, 0.5, 32767.0 / 32768.0, 0.0]);
    }

    #[test]
    fn pcm_decoding_rejects_partial_sample() {
        assert_eq!(decode_pcm_le(&[0, 1, 2]), Err(TunerError::OddPcmLength(3)));
    }

    #[test]
    fn sink_reports_disconnected_worker() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let sink = CaptureSink::new(tx);
        assert!(sink.push_i16(&[16384]));
        assert_eq!(rx.try_recv().unwrap(), vec![0.5]);
        // Full queue drops silently.
        assert!(sink.push_samples(&[0.1]));
        assert!(sink.push_samples(&[0.2]));
        assert_eq!(rx.len(), 1);
        drop(rx);
        assert!(!sink.push_samples(&[0.3]));
    }
}
