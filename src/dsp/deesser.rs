//! De-esser
//!
//! A band-pass sidechain around the sibilance frequency drives broadband gain
//! reduction on each channel. With `monitor` on, the sidechain itself is
//! output so the band can be tuned by ear.

use super::compressor::{detector_db, gain_reduction_db};
use super::filters::{Biquad, EnvelopeFollower, FilterType};
use super::processor::{selector, GainReductionMeter, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

pub const FREQUENCY: usize = 0;
pub const THRESHOLD: usize = 1;
pub const RATIO: usize = 2;
pub const ATTACK: usize = 3;
pub const RELEASE: usize = 4;
pub const MONITOR: usize = 5;

const SIDECHAIN_Q: f32 = 2.0;

#[derive(Debug, Clone, Default)]
struct Channel {
    sidechain: Biquad,
    envelope: EnvelopeFollower,
}

#[derive(Debug, Clone, Default)]
pub struct DeEsser {
    channels: [Channel; MAX_CHANNELS],
    meter: GainReductionMeter,
}

impl DeEsser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for DeEsser {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.meter.prepare(sample_rate);
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let threshold = params[THRESHOLD];
        let ratio = params[RATIO];
        let monitor = selector(params, MONITOR) == 1;
        let frames = block.len();
        let mut block_max = 0.0_f32;

        for (state, samples) in self.channels.iter_mut().zip(block.samples.iter_mut()) {
            state.sidechain.set(
                FilterType::BandPass,
                ctx.sample_rate,
                params[FREQUENCY],
                0.0,
                SIDECHAIN_Q,
            );
            state
                .envelope
                .set_times(params[ATTACK], params[RELEASE], ctx.sample_rate);

            for sample in samples.iter_mut() {
                let band = state.sidechain.process(*sample);
                let env = state.envelope.process(band);
                let reduction = gain_reduction_db(detector_db(env), threshold, ratio, 0.0);
                block_max = block_max.max(reduction);

                *sample = if monitor {
                    band
                } else {
                    *sample * db_to_linear(-reduction)
                };
            }
        }

        self.meter.push(block_max, frames, ctx.readout);
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            state.sidechain.reset();
            state.envelope.reset();
        }
        self.meter.reset();
    }
}
