//! Audio output using cpal
//!
//! Opens an output device and drives the engine's render callback from the
//! device's audio thread. The driver owns the staging needed to adapt the
//! engine's f32 output to whatever sample format the device negotiated;
//! staging buffers are allocated once, before the stream starts.

use crate::audio::simd;
use crate::audio::types::OutputConfig;
use crate::error::{Error, Result};
use crate::playback::engine::EngineShared;
use crate::playback::mixer::MAX_BLOCK_FRAMES;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platform output stream bound to an engine.
pub struct AudioOutput {
    stream: Option<Stream>,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// List available output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::OutputFailed(format!("failed to enumerate devices: {e}")))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the device, build a stream around the engine callback, and
    /// start playback.
    pub fn start(
        device_name: Option<&str>,
        config: &OutputConfig,
        shared: Arc<EngineShared>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::OutputFailed(format!("failed to enumerate devices: {e}")))?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| Error::OutputFailed(format!("device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| Error::OutputFailed("no default output device found".into()))?
        };

        let resolved_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {resolved_name}");

        let (stream_config, sample_format) = Self::get_best_config(&device, config)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            stream_config.sample_rate.0, stream_config.channels, sample_format
        );

        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;

        let stream = match Self::build_stream(&device, &stream_config, sample_format, &shared) {
            Ok(stream) => stream,
            Err(e) => {
                // Some hosts reject fixed buffer sizes; fall back to the
                // device's own choice before giving up.
                warn!("Fixed buffer size rejected ({e}), retrying with device default");
                let mut relaxed = stream_config.clone();
                relaxed.buffer_size = BufferSize::Default;
                Self::build_stream(&device, &relaxed, sample_format, &shared)?
            }
        };

        stream
            .play()
            .map_err(|e| Error::OutputFailed(format!("failed to start stream: {e}")))?;
        info!("Audio stream started");

        Ok(Self {
            stream: Some(stream),
            device_name: resolved_name,
            sample_rate,
            channels,
        })
    }

    /// Pick the closest supported configuration to the requested one,
    /// preferring an exact sample-rate match with f32 samples.
    fn get_best_config(
        device: &Device,
        requested: &OutputConfig,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::OutputFailed(format!("failed to get device configs: {e}")))?;

        let preferred = supported.find(|range| {
            range.channels() == requested.channels
                && range.min_sample_rate().0 <= requested.sample_rate
                && range.max_sample_rate().0 >= requested.sample_rate
                && range.sample_format() == SampleFormat::F32
        });

        let (mut stream_config, sample_format) = if let Some(range) = preferred {
            let format = range.sample_format();
            (
                range
                    .with_sample_rate(cpal::SampleRate(requested.sample_rate))
                    .config(),
                format,
            )
        } else {
            let default = device
                .default_output_config()
                .map_err(|e| Error::OutputFailed(format!("failed to get default config: {e}")))?;
            let format = default.sample_format();
            (default.config(), format)
        };

        stream_config.buffer_size = BufferSize::Fixed(requested.buffer_size);
        Ok((stream_config, sample_format))
    }

    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        shared: &Arc<EngineShared>,
    ) -> Result<Stream> {
        match sample_format {
            SampleFormat::F32 => Self::build_stream_f32(device, config, Arc::clone(shared)),
            SampleFormat::I16 => Self::build_stream_i16(device, config, Arc::clone(shared)),
            SampleFormat::U16 => Self::build_stream_u16(device, config, Arc::clone(shared)),
            other => Err(Error::OutputFailed(format!(
                "unsupported sample format: {other:?}"
            ))),
        }
    }

    fn build_stream_f32(
        device: &Device,
        config: &StreamConfig,
        shared: Arc<EngineShared>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        let error_shared = Arc::clone(&shared);

        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    shared.render(data, channels);
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                    error_shared.notify_device_lost();
                },
                None,
            )
            .map_err(|e| Error::OutputFailed(format!("failed to build stream: {e}")))
    }

    fn build_stream_i16(
        device: &Device,
        config: &StreamConfig,
        shared: Arc<EngineShared>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        let error_shared = Arc::clone(&shared);
        // Staging reused across callbacks; never grown on the audio thread
        let mut staging = vec![0.0f32; MAX_BLOCK_FRAMES * channels];

        device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let n = data.len().min(staging.len());
                    shared.render(&mut staging[..n], channels);
                    simd::float_to_int16(&mut data[..n], &staging[..n]);
                    data[n..].fill(0);
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                    error_shared.notify_device_lost();
                },
                None,
            )
            .map_err(|e| Error::OutputFailed(format!("failed to build stream: {e}")))
    }

    fn build_stream_u16(
        device: &Device,
        config: &StreamConfig,
        shared: Arc<EngineShared>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        let error_shared = Arc::clone(&shared);
        let mut staging = vec![0.0f32; MAX_BLOCK_FRAMES * channels];

        device
            .build_output_stream(
                config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    let n = data.len().min(staging.len());
                    shared.render(&mut staging[..n], channels);
                    for (out, &sample) in data[..n].iter_mut().zip(&staging[..n]) {
                        // Map [-1.0, 1.0] to [0, 65535]
                        let clamped = sample.clamp(-1.0, 1.0);
                        *out = ((clamped + 1.0) * 32767.5) as u16;
                    }
                    data[n..].fill(32768);
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                    error_shared.notify_device_lost();
                },
                None,
            )
            .map_err(|e| Error::OutputFailed(format!("failed to build stream: {e}")))
    }

    /// Stop playback and drop the stream.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream: {e}");
            }
            drop(stream);
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Sample rate the device actually runs at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count the device actually runs at.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
