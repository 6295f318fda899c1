//! Three-band compressor
//!
//! Two cascaded LR4 crossovers split each channel into low/mid/high; every
//! band runs its own hard-knee VCA stage and the bands are summed back.

use super::compressor::{ballistics, detector_db, gain_reduction_db};
use super::filters::{time_to_coeff, ThreeBandSplit};
use super::processor::{GainReductionMeter, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

pub const LOW_FREQ: usize = 0;
pub const HIGH_FREQ: usize = 1;
/// First band's (threshold, ratio, gain) triple; mid and high follow
const BAND_PARAMS: usize = 2;
pub const ATTACK: usize = 11;
pub const RELEASE: usize = 12;

const NUM_BANDS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct BandSettings {
    threshold: f32,
    ratio: f32,
    makeup: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MultibandCompressor {
    splits: [ThreeBandSplit; MAX_CHANNELS],
    /// Gain reduction per channel and band, dB
    gr_db: [[f32; NUM_BANDS]; MAX_CHANNELS],
    meter: GainReductionMeter,
}

impl MultibandCompressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for MultibandCompressor {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.meter.prepare(sample_rate);
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let bands: [BandSettings; NUM_BANDS] = std::array::from_fn(|b| {
            let base = BAND_PARAMS + b * 3;
            BandSettings {
                threshold: params[base],
                ratio: params[base + 1],
                makeup: db_to_linear(params[base + 2]),
            }
        });
        let attack_coeff = time_to_coeff(params[ATTACK].max(0.0001), ctx.sample_rate);
        let release_coeff = time_to_coeff(params[RELEASE].max(0.001), ctx.sample_rate);

        let frames = block.len();
        let mut block_max = 0.0_f32;

        for (ch, samples) in block.samples.iter_mut().enumerate().take(MAX_CHANNELS) {
            let split = &mut self.splits[ch];
            split.set_cutoffs(ctx.sample_rate, params[LOW_FREQ], params[HIGH_FREQ]);
            let gr = &mut self.gr_db[ch];

            for sample in samples.iter_mut() {
                let (low, mid, high) = split.split(*sample);
                let mut out = 0.0;
                for (b, band) in [low, mid, high].into_iter().enumerate() {
                    let settings = bands[b];
                    let target = gain_reduction_db(
                        detector_db(band),
                        settings.threshold,
                        settings.ratio,
                        0.0,
                    );
                    gr[b] = ballistics(gr[b], target, attack_coeff, release_coeff);
                    block_max = block_max.max(gr[b]);
                    out += band * db_to_linear(-gr[b]) * settings.makeup;
                }
                *sample = out;
            }
        }

        self.meter.push(block_max, frames, ctx.readout);
    }

    fn reset(&mut self) {
        self.splits.iter_mut().for_each(ThreeBandSplit::reset);
        self.gr_db = [[0.0; NUM_BANDS]; MAX_CHANNELS];
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

    fn steady_peak(buffer: &AudioBuffer) -> f32 {
        buffer.channel(0)[36000..]
            .iter()
            .fold(0.0_f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_band_param_layout() {
        let descriptor = ModuleType::MultibandCompressor.descriptor();
        assert_eq!(descriptor.param_index("threshLow"), Some(BAND_PARAMS));
        assert_eq!(descriptor.param_index("gainHigh"), Some(BAND_PARAMS + 8));
        assert_eq!(descriptor.param_index("attack"), Some(ATTACK));
        assert_eq!(descriptor.param_index("release"), Some(RELEASE));
    }

    #[test]
    fn test_unity_settings_pass_signal() {
        let mut mb = MultibandCompressor::new();
        mb.prepare(SR, 512);
        let readout = ModuleReadout::default();
        let params = params_for(
            ModuleType::MultibandCompressor,
            &[("ratioLow", 1.0), ("ratioMid", 1.0), ("ratioHigh", 1.0)],
        );
        let mut buffer = sine(1000.0, 0.5, 48000, ChannelLayout::Mono);
        run(&mut mb, &mut buffer, &params, &readout);

        // LR4 bands sum to an all-pass: amplitude is preserved
        let peak = steady_peak(&buffer);
        assert!((peak - 0.5).abs() < 0.02, "peak {}", peak);
        assert_eq!(readout.gain_reduction(), 0.0);
    }

    #[test]
    fn test_only_the_loud_band_is_compressed() {
        let mut mb = MultibandCompressor::new();
        mb.prepare(SR, 512);
        let readout = ModuleReadout::default();
        // only the low band compresses hard
        let params = params_for(
            ModuleType::MultibandCompressor,
            &[
                ("threshLow", -30.0),
                ("ratioLow", 20.0),
                ("ratioMid", 1.0),
                ("ratioHigh", 1.0),
            ],
        );

        let mut low_tone = sine(60.0, 0.8, 48000, ChannelLayout::Mono);
        run(&mut mb, &mut low_tone, &params, &readout);
        assert!(steady_peak(&low_tone) < 0.3, "low {}", steady_peak(&low_tone));
        assert!(readout.gain_reduction() > 6.0);

        mb.reset();
        let mut mid_tone = sine(1000.0, 0.8, 48000, ChannelLayout::Mono);
        run(&mut mb, &mut mid_tone, &params, &readout);
        assert!(steady_peak(&mid_tone) > 0.7, "mid {}", steady_peak(&mid_tone));
    }
}
