//! Transient shaper
//!
//! The gap between a fast (10 ms) and a slow (100 ms) envelope marks attacks
//! (fast above slow) and sustain (fast below slow); each gets its own gain.

use super::filters::EnvelopeFollower;
use super::processor::{mix, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

pub const ATTACK_GAIN: usize = 0;
pub const SUSTAIN_GAIN: usize = 1;
pub const MIX: usize = 2;

const FAST_SECS: f32 = 0.010;
const SLOW_SECS: f32 = 0.100;

#[derive(Debug, Clone, Default)]
pub struct TransientShaper {
    fast: [EnvelopeFollower; MAX_CHANNELS],
    slow: [EnvelopeFollower; MAX_CHANNELS],
}

impl TransientShaper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for TransientShaper {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        for env in &mut self.fast {
            env.set_times(FAST_SECS, FAST_SECS, sample_rate);
        }
        for env in &mut self.slow {
            env.set_times(SLOW_SECS, SLOW_SECS, sample_rate);
        }
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        let attack_gain = params[ATTACK_GAIN];
        let sustain_gain = params[SUSTAIN_GAIN];
        let amount = params[MIX];

        for (ch, samples) in block.samples.iter_mut().enumerate().take(MAX_CHANNELS) {
            let (fast, slow) = (&mut self.fast[ch], &mut self.slow[ch]);
            for sample in samples.iter_mut() {
                let delta = fast.process(*sample) - slow.process(*sample);
                let gain_db = if delta > 0.0 {
                    delta * attack_gain * 2.0
                } else {
                    delta.abs() * sustain_gain * 2.0
                };
                *sample = mix(*sample, *sample * db_to_linear(gain_db), amount);
            }
        }
    }

    fn reset(&mut self) {
        self.fast.iter_mut().for_each(EnvelopeFollower::reset);
        self.slow.iter_mut().for_each(EnvelopeFollower::reset);
    }
}
