//! Lookahead brickwall limiter
//!
//! The audio path is delayed by `lookahead` while the detector listens to the
//! undelayed input, so gain reduction is already in place when a peak leaves
//! the delay line. Detection is linked across channels. Signals above
//! `threshold` are pulled down to it, the result is scaled so the threshold
//! lands on `ceiling`, and a final clamp guarantees nothing exceeds the ceiling.

use super::filters::{DelayLine, EnvelopeFollower};
use super::processor::{GainReductionMeter, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

pub const THRESHOLD: usize = 0;
pub const CEILING: usize = 1;
pub const RELEASE: usize = 2;
pub const LOOKAHEAD: usize = 3;

/// Longest supported lookahead in seconds
const MAX_LOOKAHEAD_SECS: f32 = 0.020;

/// Detector attack, in seconds
const ATTACK_SECS: f32 = 0.001;

#[derive(Debug, Clone, Default)]
pub struct Limiter {
    sample_rate: f32,
    delays: [DelayLine; MAX_CHANNELS],
    envelope: EnvelopeFollower,
    meter: GainReductionMeter,
}

impl Limiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for Limiter {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.sample_rate = sample_rate;
        // one sample of headroom: the read for N samples of lookahead is N + 1 writes back
        let max_delay = MAX_LOOKAHEAD_SECS + 1.0 / sample_rate.max(1.0);
        self.delays = std::array::from_fn(|_| DelayLine::new(max_delay, sample_rate));
        self.meter.prepare(sample_rate);
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let threshold = db_to_linear(params[THRESHOLD]);
        let ceiling = db_to_linear(params[CEILING]);
        let makeup = ceiling / threshold;
        let lookahead = (params[LOOKAHEAD].max(0.0) * 0.001 * ctx.sample_rate).round();

        self.envelope
            .set_times(ATTACK_SECS, params[RELEASE], ctx.sample_rate);

        let frames = block.len();
        let channels = block.channels().min(MAX_CHANNELS);
        let mut block_max = 0.0_f32;

        for i in 0..frames {
            let mut level = 0.0_f32;
            for ch in 0..channels {
                let x = block.samples[ch][i];
                self.delays[ch].write(x);
                level = level.max(x.abs());
            }

            let env = self.envelope.process(level);
            let limiting = if env > threshold { threshold / env } else { 1.0 };
            block_max = block_max.max(-20.0 * limiting.log10());

            let gain = limiting * makeup;
            for ch in 0..channels {
                let delayed = self.delays[ch].read(lookahead + 1.0);
                block.samples[ch][i] = (delayed * gain).clamp(-ceiling, ceiling);
            }
        }

        self.meter.push(block_max, frames, ctx.readout);
    }

    fn reset(&mut self) {
        self.delays.iter_mut().for_each(DelayLine::reset);
        self.envelope.reset();
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
    use test_case::test_case;

    fn prepared() -> Limiter {
        let mut limiter = Limiter::new();
        limiter.prepare(SR, 512);
        limiter
    }

    #[test]
    fn test_output_never_exceeds_ceiling() {
        let mut limiter = prepared();
        let readout = ModuleReadout::default();
        let params = params_for(ModuleType::Limiter, &[("threshold", -6.0), ("ceiling", -1.0)]);
        let mut buffer = sine(150.0, 1.5, 24000, ChannelLayout::Stereo);
        run(&mut limiter, &mut buffer, &params, &readout);

        let ceiling = db_to_linear(-1.0);
        assert!(buffer.peak() <= ceiling + 1e-6, "peak {}", buffer.peak());
        assert!(readout.gain_reduction() > 6.0);
    }

    #[test_case(1.0, 48 ; "one ms")]
    #[test_case(5.0, 240 ; "five ms")]
    #[test_case(19.0, 912 ; "nineteen ms")]
    #[test_case(20.0, 960 ; "maximum")]
    fn test_lookahead_delays_signal(lookahead_ms: f32, expected: usize) {
        let mut limiter = prepared();
        let readout = ModuleReadout::default();
        let params = params_for(
            ModuleType::Limiter,
            &[("threshold", 0.0), ("ceiling", 0.0), ("lookahead", lookahead_ms)],
        );
        let mut buffer = AudioBuffer::new(2048, ChannelLayout::Mono);
        buffer.set_sample(0, 0, 0.5);
        run(&mut limiter, &mut buffer, &params, &readout);

        let arrived = buffer
            .channel(0)
            .iter()
            .position(|s| (s - 0.5).abs() < 1e-6)
            .unwrap();
        assert_eq!(arrived, expected);
        assert_eq!(ModuleType::Limiter.latency_samples(&params, SR), expected);
    }

    #[test]
    fn test_zero_lookahead_is_immediate() {
        let mut limiter = prepared();
        let readout = ModuleReadout::default();
        let params = params_for(
            ModuleType::Limiter,
            &[("threshold", 0.0), ("ceiling", 0.0), ("lookahead", 0.0)],
        );
        let original = sine(440.0, 0.25, 1024, ChannelLayout::Mono);
        let mut buffer = original.clone();
        run(&mut limiter, &mut buffer, &params, &readout);
        for (a, b) in original.channel(0).iter().zip(buffer.channel(0)) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
