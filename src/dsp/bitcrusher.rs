//! Bitcrusher
//!
//! Sample-rate reduction through a shared phasor plus amplitude quantization
//! to `bits` bits. Held values are per channel.

use super::processor::{mix, selector, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const BITS: usize = 0;
pub const NORM_FREQ: usize = 1;
pub const MIX: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct Bitcrusher {
    phasor: f32,
    held: [f32; MAX_CHANNELS],
}

impl Bitcrusher {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Quantize to `floor(x * 2^bits) / 2^bits`
#[inline]
pub fn quantize(x: f32, steps: f32) -> f32 {
    (x * steps).floor() / steps
}

impl Processor for Bitcrusher {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        let steps = 2.0_f32.powi(selector(params, BITS).max(1) as i32);
        let norm_freq = params[NORM_FREQ];
        let amount = params[MIX];
        let channels = block.channels().min(MAX_CHANNELS);

        for i in 0..block.len() {
            self.phasor += norm_freq;
            let update = self.phasor >= 1.0;
            if update {
                self.phasor -= 1.0;
            }
            for ch in 0..channels {
                let x = block.samples[ch][i];
                if update {
                    self.held[ch] = quantize(x, steps);
                }
                block.samples[ch][i] = mix(x, self.held[ch], amount);
            }
        }
    }

    fn reset(&mut self) {
        self.phasor = 0.0;
        self.held = [0.0; MAX_CHANNELS];
    }
}
