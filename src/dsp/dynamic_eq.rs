//! Dynamic EQ
//!
//! One peaking band whose gain backs off as its band-passed sidechain rises
//! above threshold: the applied gain is `gain - reduction`.

use super::compressor::{detector_db, gain_reduction_db};
use super::filters::{Biquad, EnvelopeFollower, FilterType};
use super::processor::{GainReductionMeter, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const FREQUENCY: usize = 0;
pub const Q: usize = 1;
pub const GAIN: usize = 2;
pub const THRESHOLD: usize = 3;
pub const RATIO: usize = 4;
pub const ATTACK: usize = 5;
pub const RELEASE: usize = 6;

#[derive(Debug, Clone, Default)]
struct Channel {
    sidechain: Biquad,
    band: Biquad,
    envelope: EnvelopeFollower,
}

#[derive(Debug, Clone, Default)]
pub struct DynamicEq {
    channels: [Channel; MAX_CHANNELS],
    meter: GainReductionMeter,
}

impl DynamicEq {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for DynamicEq {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.meter.prepare(sample_rate);
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let (freq, q, gain) = (params[FREQUENCY], params[Q], params[GAIN]);
        let frames = block.len();
        let mut block_max = 0.0_f32;

        for (state, samples) in self.channels.iter_mut().zip(block.samples.iter_mut()) {
            state
                .sidechain
                .set(FilterType::BandPass, ctx.sample_rate, freq, 0.0, q);
            state
                .envelope
                .set_times(params[ATTACK], params[RELEASE], ctx.sample_rate);

            for sample in samples.iter_mut() {
                let env = state.envelope.process(state.sidechain.process(*sample));
                let reduction =
                    gain_reduction_db(detector_db(env), params[THRESHOLD], params[RATIO], 0.0);
                block_max = block_max.max(reduction);

                // the design cache makes this a no-op while the gain holds still
                state
                    .band
                    .set(FilterType::Peak, ctx.sample_rate, freq, gain - reduction, q);
                *sample = state.band.process(*sample);
            }
        }

        self.meter.push(block_max, frames, ctx.readout);
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            state.sidechain.reset();
            state.band.reset();
            state.envelope.reset();
        }
        self.meter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::processor::test_support::{params_for, run, sine, SR};
    use crate::dsp::registry::ModuleType;
    use crate::engine::buffer::ChannelLayout;
    use crate::metering::readout::ModuleReadout;

    fn tail_peak(buffer: &AudioBuffer) -> f32 {
        buffer.channel(0)[36000..]
            .iter()
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_quiet_band_gets_static_gain() {
        let mut eq = DynamicEq::new();
        eq.prepare(SR, 512);
        let readout = ModuleReadout::default();
        let params = params_for(ModuleType::DynamicEq, &[("gain", 6.0), ("threshold", 0.0)]);
        let mut buffer = sine(1000.0, 0.1, 48000, ChannelLayout::Mono);
        run(&mut eq, &mut buffer, &params, &readout);
        assert!((tail_peak(&buffer) - 0.2).abs() < 0.01, "peak {}", tail_peak(&buffer));
        assert_eq!(readout.gain_reduction(), 0.0);
    }

    #[test]
    fn test_loud_band_is_cut() {
        let mut eq = DynamicEq::new();
        eq.prepare(SR, 512);
        let readout = ModuleReadout::default();
        let params = params_for(
            ModuleType::DynamicEq,
            &[("threshold", -40.0), ("ratio", 8.0)],
        );
        let mut buffer = sine(1000.0, 0.8, 48000, ChannelLayout::Stereo);
        run(&mut eq, &mut buffer, &params, &readout);
        assert!(tail_peak(&buffer) < 0.4, "peak {}", tail_peak(&buffer));
        assert!(readout.gain_reduction() > 10.0);
    }
}
