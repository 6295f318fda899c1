//! Static equalizers
//!
//! - [`ParametricEq`]: low shelf, mid peak, high shelf in series per channel
//! - [`MidSideEq`]: one peaking band on the mid signal and one on the side

use super::filters::{Biquad, FilterType};
use super::processor::{ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

/// Parameter indices for [`ParametricEq`]
pub mod parametric {
    pub const LOW_FREQ: usize = 0;
    pub const LOW_GAIN: usize = 1;
    pub const MID_FREQ: usize = 2;
    pub const MID_GAIN: usize = 3;
    pub const MID_Q: usize = 4;
    pub const HIGH_FREQ: usize = 5;
    pub const HIGH_GAIN: usize = 6;
}

/// Parameter indices for [`MidSideEq`]
pub mod midside {
    pub const MID_GAIN: usize = 0;
    pub const MID_FREQ: usize = 1;
    pub const SIDE_GAIN: usize = 2;
    pub const SIDE_FREQ: usize = 3;
}

const SHELF_Q: f32 = 0.707;
const MIDSIDE_Q: f32 = 1.0;

// ============================================================================
// Parametric EQ
// ============================================================================

#[derive(Debug, Clone, Default)]
struct EqChannel {
    low: Biquad,
    mid: Biquad,
    high: Biquad,
}

/// Three-band EQ
#[derive(Debug, Clone, Default)]
pub struct ParametricEq {
    channels: [EqChannel; MAX_CHANNELS],
}

impl ParametricEq {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for ParametricEq {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        use parametric::*;
        let sr = ctx.sample_rate;

        for (state, samples) in self.channels.iter_mut().zip(block.samples.iter_mut()) {
            state
                .low
                .set(FilterType::LowShelf, sr, params[LOW_FREQ], params[LOW_GAIN], SHELF_Q);
            state
                .mid
                .set(FilterType::Peak, sr, params[MID_FREQ], params[MID_GAIN], params[MID_Q]);
            state.high.set(
                FilterType::HighShelf,
                sr,
                params[HIGH_FREQ],
                params[HIGH_GAIN],
                SHELF_Q,
            );

            for sample in samples.iter_mut() {
                *sample = state.high.process(state.mid.process(state.low.process(*sample)));
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            state.low.reset();
            state.mid.reset();
            state.high.reset();
        }
    }
}

// ============================================================================
// Mid/Side EQ
// ============================================================================

/// Peaking EQ on the mid and side signals; mono input passes through
#[derive(Debug, Clone, Default)]
pub struct MidSideEq {
    mid: Biquad,
    side: Biquad,
}

impl MidSideEq {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for MidSideEq {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        use midside::*;
        let Some((left, right)) = block.stereo_mut() else {
            return;
        };

        self.mid.set(
            FilterType::Peak,
            ctx.sample_rate,
            params[MID_FREQ],
            params[MID_GAIN],
            MIDSIDE_Q,
        );
        self.side.set(
            FilterType::Peak,
            ctx.sample_rate,
            params[SIDE_FREQ],
            params[SIDE_GAIN],
            MIDSIDE_Q,
        );

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mid = self.mid.process((*l + *r) * 0.5);
            let side = self.side.process((*l - *r) * 0.5);
            *l = mid + side;
            *r = mid - side;
        }
    }

    fn reset(&mut self) {
        self.mid.reset();
        self.side.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::processor::test_support::{params_for, run, sine, SR};
    use crate::dsp::registry::ModuleType;
    use crate::engine::buffer::ChannelLayout;
    use crate::metering::readout::ModuleReadout;

    fn tail_peak(buffer: &AudioBuffer, ch: usize) -> f32 {
        buffer.channel(ch)[36000..]
            .iter()
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_flat_parametric_is_transparent() {
        let mut eq = ParametricEq::new();
        eq.prepare(SR, 512);
        let params = params_for(ModuleType::ParametricEq, &[]);
        let original = sine(440.0, 0.5, 4096, ChannelLayout::Stereo);
        let mut buffer = original.clone();
        run(&mut eq, &mut buffer, &params, &ModuleReadout::default());
        for (a, b) in original.channel(1).iter().zip(buffer.channel(1)) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_mid_band_boost() {
        let mut eq = ParametricEq::new();
        eq.prepare(SR, 512);
        let params = params_for(ModuleType::ParametricEq, &[("midGain", 12.0)]);
        let mut buffer = sine(1000.0, 0.1, 48000, ChannelLayout::Mono);
        run(&mut eq, &mut buffer, &params, &ModuleReadout::default());
        assert!((tail_peak(&buffer, 0) - 0.398).abs() < 0.01, "{}", tail_peak(&buffer, 0));
    }

    #[test]
    fn test_midside_cuts_side_only() {
        let mut eq = MidSideEq::new();
        eq.prepare(SR, 512);
        let params = params_for(ModuleType::MidsideEq, &[("sideGain", -24.0)]);

        // identical channels are pure mid
        let mut mono_content = sine(1000.0, 0.5, 48000, ChannelLayout::Stereo);
        run(&mut eq, &mut mono_content, &params, &ModuleReadout::default());
        assert!((tail_peak(&mono_content, 0) - 0.5).abs() < 0.01);

        // opposite polarity is pure side
        eq.reset();
        let mut side_content = sine(1000.0, 0.5, 48000, ChannelLayout::Stereo);
        for s in side_content.channel_mut(1) {
            *s = -*s;
        }
        run(&mut eq, &mut side_content, &params, &ModuleReadout::default());
        assert!(tail_peak(&side_content, 0) < 0.05);
    }

    #[test]
    fn test_midside_passes_mono() {
        let mut eq = MidSideEq::new();
        eq.prepare(SR, 512);
        let params = params_for(ModuleType::MidsideEq, &[("midGain", 12.0)]);
        let original = sine(1000.0, 0.5, 2048, ChannelLayout::Mono);
        let mut buffer = original.clone();
        run(&mut eq, &mut buffer, &params, &ModuleReadout::default());
        assert_eq!(buffer, original);
    }
}
