//! WAV import and export
//!
//! Audio is decoded to 32-bit float at the file's native sample rate; the rack
//! processes at whatever rate the buffer carries. Export encodes 16- or 24-bit
//! integer PCM or 32-bit float.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{RackError, Result};

/// Export encoding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFormat {
    /// Bit depth: 16, 24 (integer) or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 24 }
    }
}

impl ExportFormat {
    /// Create an export format, rejecting unsupported bit depths
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(ExportFormat { bit_depth }),
            other => Err(RackError::InvalidConfig {
                reason: format!("{}-bit export (only 16, 24, 32 supported)", other),
            }),
        }
    }

    fn wav_spec(&self, channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: if self.bit_depth == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Import a WAV file into an [`AudioBuffer`]
///
/// # Errors
/// * `Wav` - the file is missing or not a readable WAV file
/// * `InvalidAudio` - more than two channels, or an unsupported bit depth
/// * `EmptyAudio` - the file holds no frames
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let layout = ChannelLayout::from_count(channels).ok_or_else(|| RackError::InvalidAudio {
        reason: format!("{}-channel audio (only mono/stereo supported)", channels),
    })?;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;
    buffer.validate()?;

    debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = buffer.len(),
        "imported audio"
    );
    Ok(buffer)
}

/// Export an [`AudioBuffer`] to a WAV file
///
/// Samples are clamped to the integer range for 16/24-bit output; float output
/// is written unchanged.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = ExportFormat::new(format.bit_depth)?
        .wav_spec(buffer.channels() as u16, buffer.sample_rate);
    let mut writer = WavWriter::create(path, spec)?;

    let interleaved = buffer.to_interleaved();
    match format.bit_depth {
        16 => {
            for sample in interleaved {
                writer.write_sample((sample * 32767.0).clamp(-32768.0, 32767.0) as i16)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                writer.write_sample((sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    debug!(path = %path.display(), bit_depth = format.bit_depth, "exported audio");
    Ok(())
}

/// Generate a mono sine tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let mut buffer = generate_stereo_test_tone(frequency, frequency, duration_secs, sample_rate);
    buffer.samples.truncate(1);
    buffer
}

/// Generate a stereo buffer with a different sine in each channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::with_sample_rate(num_samples, ChannelLayout::Stereo, sample_rate);

    for (ch, freq) in [freq_left, freq_right].into_iter().enumerate() {
        let angular_freq = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        for (i, sample) in buffer.channel_mut(ch).iter_mut().enumerate() {
            *sample = (angular_freq * i as f32).sin();
        }
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let samples = match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (SampleFormat::Int, bits) => {
            return Err(RackError::InvalidAudio {
                reason: format!("{}-bit integer audio", bits),
            })
        }
    };
    Ok(samples)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 1.0, 48000);
        assert_eq!(buffer.num_samples(), 48000);
        assert_eq!(buffer.num_channels(), 1);

        // half a cycle in, the sine is back near zero
        let half_cycle = (48000.0 / 440.0 / 2.0) as usize;
        assert!(buffer.samples[0][half_cycle].abs() < 0.1);
    }

    #[test_case(16, 1e-4 ; "16-bit")]
    #[test_case(24, 1e-6 ; "24-bit")]
    #[test_case(32, 1e-7 ; "32-bit float")]
    fn test_export_then_import(bit_depth: u16, tolerance: f32) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let original = generate_stereo_test_tone(440.0, 880.0, 0.25, 44100);
        export_audio(&original, &path, ExportFormat::new(bit_depth).unwrap()).unwrap();
        let imported = import_audio(&path).unwrap();

        assert_eq!(imported.sample_rate, 44100);
        assert_eq!(imported.num_channels(), 2);
        assert_eq!(imported.num_samples(), original.num_samples());
        for ch in 0..2 {
            for (a, b) in original.channel(ch).iter().zip(imported.channel(ch)) {
                assert!((a - b).abs() < tolerance, "ch {}: {} vs {}", ch, a, b);
            }
        }
    }

    #[test]
    fn test_export_format_rejects_unsupported_depth() {
        assert!(ExportFormat::new(20).is_err());
        assert_eq!(ExportFormat::default().bit_depth, 24);
    }

    #[test]
    fn test_import_nonexistent_file() {
        let result = import_audio(Path::new("/nonexistent/path/audio.wav"));
        assert!(matches!(result, Err(RackError::Wav(_))));
    }
}
