//! # Audio Capture Module
//!
//! Microphone capture with CPAL. Picks an input configuration close to the
//! rate the tuner expects, downmixes to mono and pushes every callback's
//! samples into the detector's capture sink.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use log::{error, info, warn};
use tuner_core::CaptureSink;

/// An input device together with the stream configuration chosen for it.
pub struct Input {
    device: cpal::Device,
    config: SupportedStreamConfig,
}

impl Input {
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    /// Builds and starts the input stream.
    ///
    /// The stream stops when the returned handle is dropped.
    pub fn start(self, sink: CaptureSink) -> Result<cpal::Stream> {
        let channels = self.channels();
        let format = self.config.sample_format();
        let config: cpal::StreamConfig = self.config.into();
        let err_fn = |err| error!("audio stream error: {err}");
        let mut watch = DeliveryWatch::default();

        let stream = match format {
            SampleFormat::I16 => self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let delivered = if channels == 1 {
                        sink.push_i16(data)
                    } else {
                        sink.push_i16(&downmix_i16(data, channels))
                    };
                    watch.observe(delivered);
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => self.device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let delivered = if channels == 1 {
                        sink.push_samples(data)
                    } else {
                        sink.push_samples(&downmix_f32(data, channels))
                    };
                    watch.observe(delivered);
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format {other:?}")),
        };

        stream.play().context("starting the input stream")?;
        Ok(stream)
    }
}

/// Notices when the detector stops taking audio, so it is reported once
/// instead of on every callback.
#[derive(Debug, Default)]
struct DeliveryWatch {
    reported: bool,
}

impl DeliveryWatch {
    /// Returns `true` for the first refused push only.
    fn observe(&mut self, delivered: bool) -> bool {
        if delivered || self.reported {
            return false;
        }
        self.reported = true;
        warn!("detector no longer accepts audio, capture is idle");
        true
    }
}

/// Selects the default input device and a configuration for `target_rate`.
pub fn open_default_input(target_rate: u32) -> Result<Input> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let range = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No 16-bit or f32 input format found"))?;

    let config = if range.min_sample_rate().0 <= target_rate
        && target_rate <= range.max_sample_rate().0
    {
        range.with_sample_rate(cpal::SampleRate(target_rate))
    } else {
        let fallback = range.with_max_sample_rate();
        warn!(
            "{} Hz not supported, capturing at {} Hz",
            target_rate,
            fallback.sample_rate().0
        );
        fallback
    };

    info!(
        "Selected {} Hz, {} channel(s), {:?}",
        config.sample_rate().0,
        config.channels(),
        config.sample_format()
    );
    Ok(Input { device, config })
}

/// Ranks configurations: the target rate first, then 16-bit PCM over f32,
/// then fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .min_by_key(|c| {
            let rate_miss = if c.min_sample_rate().0 <= target_rate
                && target_rate <= c.max_sample_rate().0
            {
                0
            } else {
                let min_diff = c.min_sample_rate().0.abs_diff(target_rate);
                let max_diff = c.max_sample_rate().0.abs_diff(target_rate);
                min_diff.min(max_diff)
            };
            let format_rank = u8::from(c.sample_format() != SampleFormat::I16);
            (rate_miss, format_rank, c.channels())
        })
}

fn downmix_i16(data: &[i16], channels: usize) -> Vec<i16> {
    data.chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn downmix_f32(data: &[f32], channels: usize) -> Vec<f32> {
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
