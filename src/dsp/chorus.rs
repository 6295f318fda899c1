//! Chorus
//!
//! A short delay line per channel whose read position swings by `depth`
//! seconds around `delayTime`. The right channel's LFO runs a quarter cycle
//! ahead of the left for stereo movement.

use std::f32::consts::FRAC_PI_2;

use super::filters::{DelayLine, Lfo};
use super::processor::{mix, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const FREQUENCY: usize = 0;
pub const DELAY_TIME: usize = 1;
pub const DEPTH: usize = 2;
pub const FEEDBACK: usize = 3;
pub const WET: usize = 4;

/// Covers the longest base delay plus the deepest swing
const MAX_DELAY_SECS: f32 = 0.12;

#[derive(Debug, Clone, Default)]
pub struct Chorus {
    lines: [DelayLine; MAX_CHANNELS],
    lfos: [Lfo; MAX_CHANNELS],
}

impl Chorus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Chorus {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.lines = std::array::from_fn(|_| DelayLine::new(MAX_DELAY_SECS, sample_rate));
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let sr = ctx.sample_rate;
        let rate = params[FREQUENCY];
        let base = params[DELAY_TIME];
        let depth = params[DEPTH];
        let feedback = params[FEEDBACK];
        let wet = params[WET];

        for ((line, lfo), samples) in self
            .lines
            .iter_mut()
            .zip(self.lfos.iter_mut())
            .zip(block.samples.iter_mut())
        {
            for sample in samples.iter_mut() {
                let x = *sample;
                let delay = (base + depth * lfo.sine(rate, sr)) * sr;
                let delayed = line.read(delay);
                line.write(x + delayed * feedback);
                *sample = mix(x, delayed, wet);
            }
        }
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
        self.lfos[0].reset_to(0.0);
        self.lfos[1].reset_to(FRAC_PI_2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::processor::test_support::{params_for, run, sine, SR};
    use crate::dsp::registry::ModuleType;
    use crate::engine::buffer::ChannelLayout;
    use crate::metering::readout::ModuleReadout;

    #[test]
    fn test_dry_mix_is_identity() {
        let mut chorus = Chorus::new();
        chorus.prepare(SR, 512);
        let params = params_for(ModuleType::Chorus, &[("wet", 0.0)]);
        let original = sine(330.0, 0.5, 4096, ChannelLayout::Stereo);
        let mut buffer = original.clone();
        run(&mut chorus, &mut buffer, &params, &ModuleReadout::default());
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_channels_modulate_differently() {
        let mut chorus = Chorus::new();
        chorus.prepare(SR, 512);
        let params = params_for(
            ModuleType::Chorus,
            &[("wet", 1.0), ("depth", 0.01), ("frequency", 5.0)],
        );
        let mut buffer = sine(330.0, 0.5, 9600, ChannelLayout::Stereo);
        run(&mut chorus, &mut buffer, &params, &ModuleReadout::default());

        let differs = buffer.channel(0)[6000..]
            .iter()
            .zip(&buffer.channel(1)[6000..])
            .any(|(l, r)| (l - r).abs() > 1e-3);
        assert!(differs);
        assert!(buffer.is_finite());
    }
}
