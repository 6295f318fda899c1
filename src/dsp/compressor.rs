//! Compressor
//!
//! Stereo-linked peak compressor with a soft-knee gain computer and one-pole
//! attack/release ballistics on the gain reduction (in dB). Four detector
//! characters share the same gain stage:
//! - VCA: feed-forward, fixed release
//! - FET: feed-back, the detector listens to the previous output sample
//! - Opto: program-dependent release that speeds up on loud material
//! - VarMu: ratio grows with overshoot, scaled by the knee control

use super::filters::time_to_coeff;
use super::processor::{mix, selector, GainReductionMeter, ProcessContext, Processor};
use crate::engine::buffer::{db_to_linear, AudioBuffer};

pub const THRESHOLD: usize = 0;
pub const RATIO: usize = 1;
pub const ATTACK: usize = 2;
pub const RELEASE: usize = 3;
pub const KNEE: usize = 4;
pub const MAKEUP_GAIN: usize = 5;
pub const MODE: usize = 6;
pub const MIX: usize = 7;

/// Detector offset so silence maps to -120 dB instead of -inf
const DETECTOR_FLOOR: f32 = 1e-6;

/// Compressor detector character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressorMode {
    #[default]
    Vca,
    Fet,
    Opto,
    VarMu,
}

impl CompressorMode {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => CompressorMode::Fet,
            2 => CompressorMode::Opto,
            3 => CompressorMode::VarMu,
            _ => CompressorMode::Vca,
        }
    }
}

/// Peak detector level in dB
#[inline]
pub fn detector_db(level: f32) -> f32 {
    20.0 * (level.abs() + DETECTOR_FLOOR).log10()
}

/// Static gain computer: gain reduction (positive dB) for a detector level
///
/// Hard knee when `knee_db` is zero, otherwise a quadratic blend across
/// `threshold ± knee/2`.
#[inline]
pub fn gain_reduction_db(input_db: f32, threshold_db: f32, ratio: f32, knee_db: f32) -> f32 {
    let slope = 1.0 - 1.0 / ratio.max(1.0);
    let overshoot = input_db - threshold_db;

    if knee_db > 0.0 {
        let half_knee = knee_db / 2.0;
        if overshoot <= -half_knee {
            0.0
        } else if overshoot >= half_knee {
            overshoot * slope
        } else {
            let x = overshoot + half_knee;
            slope * x * x / (2.0 * knee_db)
        }
    } else if overshoot > 0.0 {
        overshoot * slope
    } else {
        0.0
    }
}

/// One-pole smoothing of a gain-reduction value
#[inline]
pub fn ballistics(current: f32, target: f32, attack_coeff: f32, release_coeff: f32) -> f32 {
    let coeff = if target > current {
        attack_coeff
    } else {
        release_coeff
    };
    coeff * current + (1.0 - coeff) * target
}

/// Stereo-linked compressor
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    sample_rate: f32,
    /// Current gain reduction in dB (positive)
    gr_db: f32,
    /// Peak of the previous output frame, for FET feedback detection
    last_output: f32,
    meter: GainReductionMeter,
}

impl Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gain reduction in dB for metering
    pub fn gain_reduction_db(&self) -> f32 {
        self.gr_db
    }
}

impl Processor for Compressor {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.sample_rate = sample_rate;
        self.meter.prepare(sample_rate);
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let threshold = params[THRESHOLD];
        let ratio = params[RATIO];
        let knee = params[KNEE];
        let makeup = db_to_linear(params[MAKEUP_GAIN]);
        let mode = CompressorMode::from_index(selector(params, MODE));
        let amount = params[MIX];

        let attack_coeff = time_to_coeff(params[ATTACK].max(0.0001), ctx.sample_rate);
        let base_release_coeff = time_to_coeff(params[RELEASE].max(0.001), ctx.sample_rate);

        let frames = block.len();
        let channels = block.channels();
        let mut block_max = 0.0_f32;

        for i in 0..frames {
            let detector = match mode {
                CompressorMode::Fet => self.last_output,
                _ => (0..channels).fold(0.0_f32, |m, ch| m.max(block.samples[ch][i].abs())),
            };
            let env_db = detector_db(detector);

            let target = match mode {
                CompressorMode::VarMu => {
                    let overshoot = env_db - threshold;
                    if overshoot > 0.0 {
                        let r = 1.0 + overshoot * knee * 0.1;
                        overshoot * (1.0 - 1.0 / r.max(1.0))
                    } else {
                        0.0
                    }
                }
                _ => gain_reduction_db(env_db, threshold, ratio, knee),
            };

            let release_coeff = match mode {
                CompressorMode::Opto => base_release_coeff * (1.0 - detector.min(1.0)),
                _ => base_release_coeff,
            };

            self.gr_db = ballistics(self.gr_db, target, attack_coeff, release_coeff);
            block_max = block_max.max(self.gr_db);

            let gain = db_to_linear(-self.gr_db) * makeup;
            let mut out_peak = 0.0_f32;
            for ch in 0..channels {
                let x = block.samples[ch][i];
                let processed = x * gain;
                out_peak = out_peak.max(processed.abs());
                block.samples[ch][i] = mix(x, processed, amount);
            }
            self.last_output = out_peak;
        }

        self.meter.push(block_max, frames, ctx.readout);
    }

    fn reset(&mut self) {
        self.gr_db = 0.0;
        self.last_output = 0.0;
        self.meter.reset();
    }
}
