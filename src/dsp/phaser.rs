//! Phaser
//!
//! A cascade of first-order all-pass stages whose break frequency is swept
//! exponentially by a shared sine LFO, `base * 2^(lfo * octaves)`.

use super::filters::{allpass_alpha, Lfo, OnePoleAllPass};
use super::processor::{mix, selector, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const STAGES: usize = 0;
pub const FREQUENCY: usize = 1;
pub const BASE_FREQUENCY: usize = 2;
pub const OCTAVES: usize = 3;
pub const WET: usize = 4;

pub const MAX_STAGES: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct Phaser {
    stages: [[OnePoleAllPass; MAX_STAGES]; MAX_CHANNELS],
    lfo: Lfo,
}

impl Phaser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Phaser {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let sr = ctx.sample_rate;
        let count = selector(params, STAGES).clamp(1, MAX_STAGES);
        let rate = params[FREQUENCY];
        let base = params[BASE_FREQUENCY];
        let octaves = params[OCTAVES];
        let wet = params[WET];
        let channels = block.channels().min(MAX_CHANNELS);

        for i in 0..block.len() {
            let sweep = self.lfo.sine(rate, sr);
            let alpha = allpass_alpha(base * 2.0_f32.powf(sweep * octaves), sr);

            for ch in 0..channels {
                let x = block.samples[ch][i];
                let shifted = self.stages[ch][..count]
                    .iter_mut()
                    .fold(x, |s, stage| stage.process(s, alpha));
                block.samples[ch][i] = mix(x, shifted, wet);
            }
        }
    }

    fn reset(&mut self) {
        for channel in &mut self.stages {
            channel.iter_mut().for_each(OnePoleAllPass::reset);
        }
        self.lfo.reset_to(0.0);
    }
}
