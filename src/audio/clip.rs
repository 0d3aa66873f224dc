//! Decoding synthesized clips and cue assets

use std::io::Cursor;

use crate::{Error, Result};

/// Decoded mono audio ready for playback
#[derive(Debug, Clone)]
pub struct DecodedClip {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Native sample rate of the clip
    pub sample_rate: u32,
}

impl DecodedClip {
    /// Playback duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// Decode an opaque audio clip.
///
/// Synthesized clips arrive as WAV; cue assets are MP3. The container is
/// sniffed from the leading bytes.
///
/// # Errors
///
/// Returns error if the bytes are neither a decodable WAV nor MP3.
pub fn decode_clip(bytes: &[u8]) -> Result<DecodedClip> {
    if bytes.len() >= 4 && &bytes[0..4] == b"RIFF" {
        decode_wav(bytes)
    } else {
        decode_mp3(bytes)
    }
}

/// Decode WAV bytes to mono f32 samples
///
/// # Errors
///
/// Returns error on malformed WAV data or an unsupported sample format
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedClip> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let raw: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| {
                s.map(|v| f32::from(v) / 32768.0)
                    .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))
            })
            .collect::<Result<_>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| Error::Audio(format!("WAV decode error: {e}"))))
            .collect::<Result<_>>()?,
        (format, bits) => {
            return Err(Error::Audio(format!(
                "unsupported WAV sample format: {bits}-bit {format:?}"
            )));
        }
    };

    let samples = downmix(&raw, usize::from(spec.channels));
    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error on malformed MP3 data or an empty stream
pub fn decode_mp3(bytes: &[u8]) -> Result<DecodedClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(Error::Audio("MP3 stream contained no audio".to_string()));
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Resample mono audio between rates
///
/// # Errors
///
/// Returns error if the resampler cannot be constructed or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        if chunk.len() == chunk_size {
            let result = resampler
                .process(&[chunk.to_vec()], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            output.extend_from_slice(&result[0]);
        }
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}

#[allow(clippy::cast_precision_loss)]
fn downmix(raw: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return raw.to_vec();
    }
    raw.chunks(channels)
        .map(|group| group.iter().sum::<f32>() / group.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::samples_to_wav;

    #[test]
    fn wav_roundtrip_preserves_length_and_rate() {
        let samples = vec![0.25f32; 800];
        let wav = samples_to_wav(&samples, 16_000).unwrap();
        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.samples.len(), 800);
        assert!((decoded.samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn clip_sniffing_routes_riff_to_wav() {
        let wav = samples_to_wav(&[0.0f32; 240], 24_000).unwrap();
        let decoded = decode_clip(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 24_000);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_clip(&[0x01, 0x02, 0x03, 0x04, 0x05]).is_err());
    }

    #[test]
    fn resample_same_rate_is_passthrough() {
        let samples = vec![0.5f32; 100];
        let out = resample(&samples, 16_000, 16_000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn resample_scales_sample_count() {
        let samples = vec![0.1f32; 2048];
        let out = resample(&samples, 16_000, 24_000).unwrap();
        // 2048 input at a 2:3 ratio, whole chunks only
        let expected = 2048.0 * 24_000.0 / 16_000.0;
        assert!(!out.is_empty());
        assert!((out.len() as f64 - expected).abs() / expected < 0.1);
    }

    #[test]
    fn duration_accounts_for_rate() {
        let clip = DecodedClip {
            samples: vec![0.0; 24_000],
            sample_rate: 24_000,
        };
        assert_eq!(clip.duration_ms(), 1000);
    }
}
