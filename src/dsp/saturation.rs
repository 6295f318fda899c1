//! Waveshapers
//!
//! [`Saturation`] is a memoryless shaper with a dry/wet mix. [`Distortion`]
//! runs its shaper at twice the sample rate (the in-between point is a linear
//! interpolation with the previous input) and averages the two results.

use std::f32::consts::FRAC_2_PI;

use super::processor::{mix, selector, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

/// Parameter indices for [`Saturation`]
pub mod saturation {
    pub const DRIVE: usize = 0;
    pub const TYPE: usize = 1;
    pub const OUTPUT_GAIN: usize = 2;
    pub const MIX: usize = 3;
}

/// Parameter indices for [`Distortion`]
pub mod distortion {
    pub const DRIVE: usize = 0;
    pub const WET: usize = 1;
    pub const TYPE: usize = 2;
    pub const OUTPUT_GAIN: usize = 3;
}

// ============================================================================
// Saturation
// ============================================================================

/// Saturation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationType {
    /// Symmetric tanh, odd harmonics
    Tape,
    /// Asymmetric: tanh above zero, `x / (1 + |x|)` below; adds even harmonics
    #[default]
    Tube,
    /// Hard clip at ±1
    Fuzz,
}

impl SaturationType {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => SaturationType::Tape,
            2 => SaturationType::Fuzz,
            _ => SaturationType::Tube,
        }
    }

    #[inline]
    pub fn shape(self, x: f32) -> f32 {
        match self {
            SaturationType::Tape => x.tanh(),
            SaturationType::Tube => {
                if x >= 0.0 {
                    x.tanh()
                } else {
                    x / (1.0 + x.abs())
                }
            }
            SaturationType::Fuzz => x.clamp(-1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Saturation;

impl Saturation {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for Saturation {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        use saturation::*;
        let drive = 1.0 + params[DRIVE];
        let curve = SaturationType::from_index(selector(params, TYPE));
        let output_gain = db_to_linear(params[OUTPUT_GAIN]);
        let amount = params[MIX];

        for samples in block.samples.iter_mut() {
            for sample in samples.iter_mut() {
                let wet = curve.shape(*sample * drive) * output_gain;
                *sample = mix(*sample, wet, amount);
            }
        }
    }

    fn reset(&mut self) {}
}

// ============================================================================
// Distortion
// ============================================================================

/// Distortion curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistortionType {
    #[default]
    Tanh,
    /// `(2/π) atan(x)`
    Atan,
    /// `x - x³/3` inside ±1.5, hard ±1 outside
    Cubic,
}

impl DistortionType {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => DistortionType::Atan,
            2 => DistortionType::Cubic,
            _ => DistortionType::Tanh,
        }
    }

    #[inline]
    pub fn shape(self, x: f32) -> f32 {
        match self {
            DistortionType::Tanh => x.tanh(),
            DistortionType::Atan => FRAC_2_PI * x.atan(),
            DistortionType::Cubic => {
                if x.abs() < 1.5 {
                    x - x * x * x / 3.0
                } else {
                    x.signum()
                }
            }
        }
    }
}

/// 2x oversampled waveshaper
///
/// `outputGain` trims the shaped signal only, so `wet = 0` is an exact
/// pass-through at any gain setting.
#[derive(Debug, Clone, Default)]
pub struct Distortion {
    last_input: [f32; MAX_CHANNELS],
}

impl Distortion {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Distortion {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        use distortion::*;
        let drive = params[DRIVE];
        let wet = params[WET];
        let curve = DistortionType::from_index(selector(params, TYPE));
        let output_gain = db_to_linear(params[OUTPUT_GAIN]);

        for (last, samples) in self.last_input.iter_mut().zip(block.samples.iter_mut()) {
            for sample in samples.iter_mut() {
                let x = *sample;
                let between = 0.5 * (x + *last);
                let shaped = 0.5 * (curve.shape(x * drive) + curve.shape(between * drive));
                *sample = mix(x, shaped * output_gain, wet);
                *last = x;
            }
        }
    }

    fn reset(&mut self) {
        self.last_input = [0.0; MAX_CHANNELS];
    }
}
