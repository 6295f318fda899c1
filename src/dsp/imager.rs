//! Three-band stereo imager
//!
//! Each channel is split at `lowFreq` and `highFreq` with LR4 crossovers; the
//! side component of each band is scaled by that band's width. Width 0 folds
//! a band to mono, 1 leaves it alone, 2 doubles its side level.

use super::filters::ThreeBandSplit;
use super::processor::{ProcessContext, Processor};
use crate::engine::buffer::AudioBuffer;

pub const LOW_FREQ: usize = 0;
pub const HIGH_FREQ: usize = 1;
pub const WIDTH_LOW: usize = 2;
pub const WIDTH_MID: usize = 3;
pub const WIDTH_HIGH: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct StereoImager {
    left: ThreeBandSplit,
    right: ThreeBandSplit,
}

impl StereoImager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[inline]
fn widen(l: f32, r: f32, width: f32) -> (f32, f32) {
    let mid = (l + r) * 0.5;
    let side = (l - r) * 0.5 * width;
    (mid + side, mid - side)
}

impl Processor for StereoImager {
    fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let Some((left, right)) = block.stereo_mut() else {
            return;
        };
        let (low_freq, high_freq) = (params[LOW_FREQ], params[HIGH_FREQ]);
        self.left.set_cutoffs(ctx.sample_rate, low_freq, high_freq);
        self.right.set_cutoffs(ctx.sample_rate, low_freq, high_freq);
        let widths = [params[WIDTH_LOW], params[WIDTH_MID], params[WIDTH_HIGH]];

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (l_low, l_mid, l_high) = self.left.split(*l);
            let (r_low, r_mid, r_high) = self.right.split(*r);

            let mut out_l = 0.0;
            let mut out_r = 0.0;
            for ((bl, br), width) in [(l_low, r_low), (l_mid, r_mid), (l_high, r_high)]
                .into_iter()
                .zip(widths)
            {
                let (wl, wr) = widen(bl, br, width);
                out_l += wl;
                out_r += wr;
            }
            *l = out_l;
            *r = out_r;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::processor::test_support::{params_for, run, sine, SR};
    use crate::dsp::registry::ModuleType;
    use crate::engine::buffer::ChannelLayout;
    use crate::metering::readout::ModuleReadout;

    fn side_content(freq: f32) -> AudioBuffer {
        let mut buffer = sine(freq, 0.5, 48000, ChannelLayout::Stereo);
        buffer.channel_mut(1).fill(0.0);
        buffer
    }

    fn tail_diff_peak(buffer: &AudioBuffer) -> f32 {
        buffer.channel(0)[36000..]
            .iter()
            .zip(&buffer.channel(1)[36000..])
            .fold(0.0_f32, |m, (l, r)| m.max((l - r).abs()))
    }

    #[test]
    fn test_zero_width_low_band_is_mono() {
        let mut imager = StereoImager::new();
        imager.prepare(SR, 512);
        let params = params_for(ModuleType::StereoImager, &[]);
        let mut buffer = side_content(40.0);
        run(&mut imager, &mut buffer, &params, &ModuleReadout::default());
        // default widthLow is 0: bass collapses to the center
        assert!(tail_diff_peak(&buffer) < 0.05, "{}", tail_diff_peak(&buffer));
    }

    #[test]
    fn test_unity_width_keeps_image() {
        let mut imager = StereoImager::new();
        imager.prepare(SR, 512);
        let params = params_for(
            ModuleType::StereoImager,
            &[("widthLow", 1.0), ("widthMid", 1.0), ("widthHigh", 1.0)],
        );
        let mut buffer = side_content(1000.0);
        run(&mut imager, &mut buffer, &params, &ModuleReadout::default());
        assert!((tail_diff_peak(&buffer) - 0.5).abs() < 0.03);
    }

    #[test]
    fn test_mono_passes_through() {
        let mut imager = StereoImager::new();
        imager.prepare(SR, 512);
        let params = params_for(ModuleType::StereoImager, &[]);
        let original = sine(200.0, 0.5, 1024, ChannelLayout::Mono);
        let mut buffer = original.clone();
        run(&mut imager, &mut buffer, &params, &ModuleReadout::default());
        assert_eq!(buffer, original);
    }
}
