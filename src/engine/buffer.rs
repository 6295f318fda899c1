//! Audio Buffer Management
//!
//! Non-interleaved 32-bit float buffers used for both whole-file (offline)
//! processing and fixed-size real-time blocks.

use crate::error::{RackError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default processing sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Smallest real-time block size in frames
pub const MIN_BLOCK_SIZE: usize = 64;

/// Largest real-time block size in frames
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Default real-time block size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 512;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `-f32::INFINITY` for zero or negative input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns `-f32::INFINITY` for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the sample peak of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Audio buffer shared by every processor and both executors
///
/// Stores audio as non-interleaved 32-bit floating point samples, one
/// `Vec<f32>` per channel. All channels always have the same length.
///
/// # Example
/// ```
/// use sonic_rack::engine::buffer::{AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
///
/// let buffer = AudioBuffer::new(DEFAULT_SAMPLE_RATE as usize, ChannelLayout::Stereo);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer at the default sample rate
    pub fn new(num_samples: usize, layout: ChannelLayout) -> Self {
        Self::with_sample_rate(num_samples, layout, DEFAULT_SAMPLE_RATE)
    }

    /// Create a zeroed buffer at an explicit sample rate
    pub fn with_sample_rate(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Build a buffer from already de-interleaved channels
    ///
    /// Fails if the channel count is not 1 or 2, or the channels differ in length.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if ChannelLayout::from_count(samples.len()).is_none() {
            return Err(RackError::InvalidAudio {
                reason: format!("{} channels (only mono/stereo supported)", samples.len()),
            });
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(RackError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
            });
        }
        if sample_rate == 0 {
            return Err(RackError::InvalidAudio {
                reason: "sample rate is zero".to_string(),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(RackError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels()
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias for len()
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.len()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Mutable access to the left and right channels at once
    ///
    /// Returns `None` for mono buffers.
    #[inline]
    pub fn stereo_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        match self.samples.as_mut_slice() {
            [left, right] => Some((left.as_mut_slice(), right.as_mut_slice())),
            _ => None,
        }
    }

    /// Get a sample at the specified channel and index
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Set a sample at the specified channel and index
    ///
    /// Returns false if the indices are out of bounds.
    #[inline]
    pub fn set_sample(&mut self, channel: usize, index: usize, value: f32) -> bool {
        if let Some(sample) = self.samples.get_mut(channel).and_then(|ch| ch.get_mut(index)) {
            *sample = value;
            return true;
        }
        false
    }

    /// Zero every sample, keeping length and layout
    pub fn silence(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Shrink or grow every channel to `frames`, zero-filling new space
    ///
    /// Never reallocates when `frames` is within the existing capacity.
    pub fn set_len(&mut self, frames: usize) {
        for channel in &mut self.samples {
            channel.resize(frames, 0.0);
        }
    }

    /// Copy `frames` frames from `source` starting at `offset` into the
    /// beginning of this buffer, zero-filling whatever the source cannot cover.
    ///
    /// Channels are matched by index; a mono source feeds both channels of a
    /// stereo destination. Returns the number of frames actually copied.
    pub fn copy_from(&mut self, source: &AudioBuffer, offset: usize) -> usize {
        let frames = self.len();
        let offset = offset.min(source.len());
        let available = (source.len() - offset).min(frames);
        let source_channels = source.channels();

        for (ch, dest) in self.samples.iter_mut().enumerate() {
            if source_channels == 0 {
                dest.fill(0.0);
                continue;
            }
            let src = &source.samples[ch.min(source_channels - 1)];
            dest[..available].copy_from_slice(&src[offset..offset + available]);
            dest[available..].fill(0.0);
        }
        available
    }

    /// Linear peak magnitude across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Reject buffers the rack cannot process
    ///
    /// Empty buffers, unsupported channel counts, and non-finite samples are errors.
    /// Quality issues such as silence or clipping are not.
    pub fn validate(&self) -> Result<()> {
        if self.channel_layout().is_none() {
            return Err(RackError::InvalidAudio {
                reason: format!("{} channels (only mono/stereo supported)", self.channels()),
            });
        }
        if self.is_empty() {
            return Err(RackError::EmptyAudio);
        }
        if !self.is_finite() {
            return Err(RackError::InvalidAudio {
                reason: "buffer contains NaN or infinite samples".to_string(),
            });
        }
        Ok(())
    }

    /// Apply gain to all samples
    pub fn apply_gain(&mut self, gain_db: f32) {
        let gain_linear = db_to_linear(gain_db);
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain_linear;
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo)
    }
}

// ============================================================================
// Tests
// ============================================================================
