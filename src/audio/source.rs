//! Microphone capture as fixed-length frames

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::audio::AudioDistributor;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per captured frame (100ms at 16kHz)
pub const FRAME_SAMPLES: usize = 1_600;

/// One fixed-length chunk of mono audio.
///
/// Frames are handed to consumers by value; no buffer is ever shared
/// mutably between consumers.
#[derive(Debug, Clone, Default)]
pub struct AudioFrame {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
}

impl AudioFrame {
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert to raw little-endian 16-bit PCM bytes, the wire format the
    /// recognition service expects.
    #[must_use]
    pub fn pcm16_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            #[allow(clippy::cast_possible_truncation)]
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

/// Captures audio from an input device and dispatches fixed-length frames
/// to the distributor.
pub struct AudioSource {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioSource {
    /// Create a new audio source.
    ///
    /// Prefers a device offering mono capture at [`SAMPLE_RATE`]; falls back
    /// to the first available input device with its default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if a named device is not found or if no input device
    /// is available at all.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let (device, config) = select_input_device(preferred_device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio source initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start capturing and dispatching frames.
    ///
    /// The capture callback accumulates samples, downmixes to mono when the
    /// device is multichannel, and dispatches one [`AudioFrame`] per
    /// [`FRAME_SAMPLES`] collected. Dispatch never blocks the callback.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started.
    pub fn start(&mut self, distributor: Arc<AudioDistributor>) -> Result<()> {
        if self.is_capturing() {
            return Ok(());
        }

        let config = self.config.clone();
        let channels = usize::from(config.channels);
        let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SAMPLES * 2);

        let stream = self
            .device
            .build_input_stream(
                &config,
                #[allow(clippy::cast_precision_loss)]
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels <= 1 {
                        pending.extend_from_slice(data);
                    } else {
                        pending.extend(
                            data.chunks(channels)
                                .map(|group| group.iter().sum::<f32>() / group.len() as f32),
                        );
                    }
                    while pending.len() >= FRAME_SAMPLES {
                        let rest = pending.split_off(FRAME_SAMPLES);
                        let samples = std::mem::replace(&mut pending, rest);
                        distributor.dispatch(&AudioFrame::new(samples));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing; no further frames are dispatched.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// The actual capture sample rate (differs from [`SAMPLE_RATE`] only on
    /// fallback devices).
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Name of the selected input device
    #[must_use]
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_default()
    }
}

fn select_input_device(preferred: Option<&str>) -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    if let Some(name) = preferred {
        let device = host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Config(format!("input device '{name}' not found")))?;
        let config = mono_config_at(&device, SAMPLE_RATE).ok_or_else(|| {
            Error::Audio(format!(
                "input device '{name}' does not support mono {SAMPLE_RATE}Hz capture"
            ))
        })?;
        return Ok((device, config));
    }

    if let Some(device) = host.default_input_device() {
        if let Some(config) = mono_config_at(&device, SAMPLE_RATE) {
            return Ok((device, config));
        }
    }

    let probed = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find_map(|device| mono_config_at(&device, SAMPLE_RATE).map(|config| (device, config)));
    if let Some(found) = probed {
        return Ok(found);
    }

    // Last resort: first input device with whatever it offers by default
    let device = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .next()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;
    let default = device
        .default_input_config()
        .map_err(|e| Error::Audio(e.to_string()))?;

    tracing::warn!(
        device = device.name().unwrap_or_default(),
        sample_rate = default.sample_rate().0,
        channels = default.channels(),
        "no device supports mono 16kHz capture, using device defaults"
    );

    Ok((device, default.config()))
}

fn mono_config_at(device: &Device, rate: u32) -> Option<StreamConfig> {
    device
        .supported_input_configs()
        .ok()?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        })
        .map(|c| c.with_sample_rate(SampleRate(rate)).config())
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
