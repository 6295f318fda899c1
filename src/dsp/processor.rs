//! Processor contract shared by every rack module
//!
//! A processor owns its DSP state and nothing else. Parameters arrive on every
//! call as a slice in descriptor order, already smoothed.

use crate::engine::buffer::AudioBuffer;
use crate::metering::readout::ModuleReadout;

/// Mono and stereo are the only layouts the rack processes
pub const MAX_CHANNELS: usize = 2;

/// Per-call context handed to [`Processor::process`]
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub sample_rate: f32,
    /// Where this module publishes meter values
    pub readout: &'a ModuleReadout,
}

/// Uniform DSP contract for one rack module type
///
/// `process` runs on the audio thread: it must not allocate, block, or do I/O,
/// and its cost must be bounded by the block length. Anything that needs
/// memory is sized in `prepare`.
pub trait Processor: Send {
    /// Size internal buffers for `sample_rate` and blocks of up to `max_block` frames
    fn prepare(&mut self, sample_rate: f32, max_block: usize);

    /// Process one block in place
    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>);

    /// Clear tails and detectors
    fn reset(&mut self);
}

// ============================================================================
// Gain Reduction Metering
// ============================================================================

/// Meter window for gain-reduction readouts
pub const GR_WINDOW_SECS: f32 = 0.1;

/// Peak-hold for gain-reduction readouts
///
/// A new maximum is published immediately; otherwise the readout falls back
/// to the window maximum once every [`GR_WINDOW_SECS`].
#[derive(Debug, Clone, Default)]
pub struct GainReductionMeter {
    window: usize,
    elapsed: usize,
    window_max: f32,
    published: f32,
}

impl GainReductionMeter {
    pub fn prepare(&mut self, sample_rate: f32) {
        self.window = ((sample_rate * GR_WINDOW_SECS) as usize).max(1);
        self.reset();
    }

    /// Record the largest reduction (positive dB) seen in a block of `frames`
    #[inline]
    pub fn push(&mut self, block_max_db: f32, frames: usize, readout: &ModuleReadout) {
        self.window_max = self.window_max.max(block_max_db);
        self.elapsed += frames;

        if self.window_max > self.published || self.elapsed >= self.window {
            self.published = self.window_max;
            readout.set_gain_reduction(self.published);
        }
        if self.elapsed >= self.window {
            self.elapsed = 0;
            self.window_max = 0.0;
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.window_max = 0.0;
        self.published = 0.0;
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read a parameter, rounding it to the nearest integer selector
#[inline]
pub fn selector(params: &[f32], index: usize) -> usize {
    params.get(index).map(|v| v.round().max(0.0) as usize).unwrap_or(0)
}

/// `wet * mix + dry * (1 - mix)`
#[inline]
pub fn mix(dry: f32, wet: f32, amount: f32) -> f32 {
    wet * amount + dry * (1.0 - amount)
}
