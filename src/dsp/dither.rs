//! TPDF dither
//!
//! Adds triangular noise of ±1 LSB at the target bit depth, rounds, and clips
//! to ±1. Depths of 32 bits and above pass audio through. The noise source is
//! seeded, and re-seeded on reset, so offline renders are repeatable.

use super::processor::{selector, ProcessContext, Processor};
use crate::engine::buffer::AudioBuffer;

pub const BIT_DEPTH: usize = 0;

const NOISE_SEED: u64 = 0x5eed_d17e;

#[derive(Debug)]
pub struct Dithering {
    rng: fastrand::Rng,
}

impl Default for Dithering {
    fn default() -> Self {
        Self {
            rng: fastrand::Rng::with_seed(NOISE_SEED),
        }
    }
}

impl Dithering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangular noise in (-1, 1)
    #[inline]
    fn tpdf(&mut self) -> f32 {
        self.rng.f32() - self.rng.f32()
    }
}

impl Processor for Dithering {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        let bits = selector(params, BIT_DEPTH);
        if bits >= 32 {
            return;
        }
        let scale = 2.0_f32.powi(bits.max(1) as i32 - 1);

        for samples in block.samples.iter_mut() {
            for sample in samples.iter_mut() {
                let quantized = (*sample * scale + self.tpdf()).round() / scale;
                *sample = quantized.clamp(-1.0, 1.0);
            }
        }
    }

    fn reset(&mut self) {
        self.rng = fastrand::Rng::with_seed(NOISE_SEED);
    }
}
