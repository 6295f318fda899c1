//! Envelope-controlled band-pass ("auto-wah")
//!
//! The input envelope opens the filter upward from `baseFrequency` by up to
//! `sensitivity * octaves` octaves; the cutoff stays below Nyquist.

use super::filters::{Biquad, EnvelopeFollower, FilterType};
use super::processor::{mix, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const BASE_FREQUENCY: usize = 0;
pub const SENSITIVITY: usize = 1;
pub const OCTAVES: usize = 2;
pub const Q: usize = 3;
pub const ATTACK: usize = 4;
pub const RELEASE: usize = 5;
pub const WET: usize = 6;

#[derive(Debug, Clone, Default)]
struct Channel {
    envelope: EnvelopeFollower,
    filter: Biquad,
}

#[derive(Debug, Clone, Default)]
pub struct Autowah {
    channels: [Channel; MAX_CHANNELS],
}

impl Autowah {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Autowah {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let sr = ctx.sample_rate;
        let base = params[BASE_FREQUENCY];
        let range = params[SENSITIVITY] * params[OCTAVES];
        let q = params[Q];
        let wet = params[WET];
        let max_cutoff = sr / 2.1;

        for (state, samples) in self.channels.iter_mut().zip(block.samples.iter_mut()) {
            state.envelope.set_times(params[ATTACK], params[RELEASE], sr);
            for sample in samples.iter_mut() {
                let x = *sample;
                let env = state.envelope.process(x);
                let cutoff = (base * 2.0_f32.powf(env * range)).min(max_cutoff);
                state.filter.set(FilterType::BandPass, sr, cutoff, 0.0, q);
                *sample = mix(x, state.filter.process(x), wet);
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            state.envelope.reset();
            state.filter.reset();
        }
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
    fn test_envelope_opens_filter() {
        let params = params_for(
            ModuleType::Autowah,
            &[("baseFrequency", 200.0), ("sensitivity", 1.0), ("octaves", 4.0)],
        );

        // a loud 2 kHz tone pushes the band up toward itself
        let mut loud = sine(2000.0, 1.0, 48000, ChannelLayout::Mono);
        let mut wah = Autowah::new();
        wah.prepare(SR, 512);
        run(&mut wah, &mut loud, &params, &ModuleReadout::default());

        let mut quiet = sine(2000.0, 0.01, 48000, ChannelLayout::Mono);
        let mut wah = Autowah::new();
        wah.prepare(SR, 512);
        run(&mut wah, &mut quiet, &params, &ModuleReadout::default());

        // relative pass-through is higher when the filter has opened
        assert!(tail_peak(&loud) / 1.0 > tail_peak(&quiet) / 0.01);
    }

    #[test]
    fn test_dry_is_identity() {
        let mut wah = Autowah::new();
        wah.prepare(SR, 512);
        let params = params_for(ModuleType::Autowah, &[("wet", 0.0)]);
        let original = sine(440.0, 0.5, 2048, ChannelLayout::Stereo);
        let mut buffer = original.clone();
        run(&mut wah, &mut buffer, &params, &ModuleReadout::default());
        assert_eq!(buffer, original);
    }
}
