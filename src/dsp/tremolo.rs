//! Tremolo
//!
//! Amplitude modulation by an LFO: gain is `1 - depth + depth * lfo`. `spread`
//! offsets the right channel's LFO phase by `spread * π`, so ±1 puts the two
//! channels in opposite phase.

use std::f32::consts::PI;

use super::filters::{Lfo, Waveform};
use super::processor::{mix, selector, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const FREQUENCY: usize = 0;
pub const DEPTH: usize = 1;
pub const SPREAD: usize = 2;
pub const WAVEFORM: usize = 3;
pub const MIX: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct Tremolo {
    lfo: Lfo,
}

impl Tremolo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Tremolo {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let rate = params[FREQUENCY];
        let depth = params[DEPTH];
        let offsets = [0.0, params[SPREAD] * PI];
        let wave = Waveform::from_index(selector(params, WAVEFORM));
        let amount = params[MIX];
        let channels = block.channels().min(MAX_CHANNELS);

        for i in 0..block.len() {
            let phase = self.lfo.advance(rate, ctx.sample_rate);
            for (ch, offset) in offsets.iter().enumerate().take(channels) {
                let gain = 1.0 - depth + depth * wave.at(phase + offset);
                let x = block.samples[ch][i];
                block.samples[ch][i] = mix(x, x * gain, amount);
            }
        }
    }

    fn reset(&mut self) {
        self.lfo.reset_to(0.0);
    }
}
