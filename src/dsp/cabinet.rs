//! Speaker cabinet simulation
//!
//! Direct-form FIR convolution with a short cabinet impulse response. The
//! response is synthesized at prepare time from seeded noise with a fast
//! exponential decay, band-limited to a guitar-speaker range and normalized
//! to unit energy, so every instance at a given sample rate is identical.

use super::filters::{Biquad, FilterType};
use super::processor::{mix, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const MIX: usize = 0;

/// Impulse response length in seconds
const IR_SECS: f32 = 0.008;
/// Decay time constant of the response envelope
const IR_DECAY_SECS: f32 = 0.0015;
const IR_SEED: u64 = 0xcab_51e;

/// Build the cabinet impulse response for `sample_rate`
pub fn cabinet_impulse_response(sample_rate: f32) -> Vec<f32> {
    let len = ((IR_SECS * sample_rate) as usize).max(1);
    let mut rng = fastrand::Rng::with_seed(IR_SEED);
    let mut low_cut = Biquad::new(FilterType::HighPass, sample_rate, 90.0, 0.0, 0.707);
    let mut presence = Biquad::new(FilterType::Peak, sample_rate, 2500.0, 4.0, 1.2);
    let mut high_cut = Biquad::new(FilterType::LowPass, sample_rate, 4500.0, 0.0, 0.9);

    let mut ir: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let noise = if i == 0 { 1.0 } else { rng.f32() * 2.0 - 1.0 };
            let x = noise * (-t / IR_DECAY_SECS).exp();
            high_cut.process(presence.process(low_cut.process(x)))
        })
        .collect();

    let energy: f32 = ir.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let norm = energy.sqrt().recip();
        ir.iter_mut().for_each(|s| *s *= norm);
    }
    ir
}

#[derive(Debug, Clone, Default)]
pub struct CabinetSim {
    ir: Vec<f32>,
    /// Input history per channel, newest at `position`
    history: [Vec<f32>; MAX_CHANNELS],
    position: usize,
}

impl CabinetSim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn impulse_response(&self) -> &[f32] {
        &self.ir
    }
}

impl Processor for CabinetSim {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.ir = cabinet_impulse_response(sample_rate);
        self.history = std::array::from_fn(|_| vec![0.0; self.ir.len()]);
        self.position = 0;
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], _ctx: &ProcessContext<'_>) {
        let taps = self.ir.len();
        if taps == 0 {
            return;
        }
        let amount = params[MIX];
        let channels = block.channels().min(MAX_CHANNELS);

        for i in 0..block.len() {
            self.position = if self.position == 0 {
                taps - 1
            } else {
                self.position - 1
            };
            for ch in 0..channels {
                let x = block.samples[ch][i];
                let history = &mut self.history[ch];
                history[self.position] = x;

                // history[position + k] holds x[n - k]
                let (wrapped, recent) = history.split_at(self.position);
                let wet: f32 = recent
                    .iter()
                    .chain(wrapped.iter())
                    .zip(self.ir.iter())
                    .map(|(h, c)| h * c)
                    .sum();
                block.samples[ch][i] = mix(x, wet, amount);
            }
        }
    }

    fn reset(&mut self) {
        self.history.iter_mut().for_each(|h| h.fill(0.0));
        self.position = 0;
    }
}
