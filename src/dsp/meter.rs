//! Loudness meter module
//!
//! Audio passes through untouched. K-weighted channel energy feeds two
//! rolling windows, 400 ms (momentary) and 3 s (short-term); both are
//! published as LUFS after every block.

use super::filters::KWeighting;
use super::processor::{ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;
use crate::metering::loudness::energy_to_lufs;

pub const MOMENTARY_SECS: f32 = 0.4;
pub const SHORT_TERM_SECS: f32 = 3.0;

/// Fixed-length running mean of per-frame energy
#[derive(Debug, Clone, Default)]
struct EnergyWindow {
    ring: Vec<f64>,
    index: usize,
    sum: f64,
}

impl EnergyWindow {
    fn with_len(len: usize) -> Self {
        Self {
            ring: vec![0.0; len.max(1)],
            index: 0,
            sum: 0.0,
        }
    }

    #[inline]
    fn push(&mut self, energy: f64) {
        if self.ring.is_empty() {
            return;
        }
        self.sum += energy - self.ring[self.index];
        self.ring[self.index] = energy;
        self.index = (self.index + 1) % self.ring.len();
    }

    /// Mean over the whole window; unfilled slots count as silence
    fn mean(&self) -> f64 {
        if self.ring.is_empty() {
            0.0
        } else {
            self.sum.max(0.0) / self.ring.len() as f64
        }
    }

    fn clear(&mut self) {
        self.ring.fill(0.0);
        self.index = 0;
        self.sum = 0.0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoudnessMeter {
    weighting: [KWeighting; MAX_CHANNELS],
    momentary: EnergyWindow,
    short_term: EnergyWindow,
}

impl LoudnessMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (momentary, short-term) loudness in LUFS
    pub fn loudness(&self) -> (f32, f32) {
        (
            energy_to_lufs(self.momentary.mean()),
            energy_to_lufs(self.short_term.mean()),
        )
    }
}

impl Processor for LoudnessMeter {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.weighting = std::array::from_fn(|_| KWeighting::new(sample_rate));
        self.momentary = EnergyWindow::with_len((MOMENTARY_SECS * sample_rate) as usize);
        self.short_term = EnergyWindow::with_len((SHORT_TERM_SECS * sample_rate) as usize);
    }

    fn process(&mut self, block: &mut AudioBuffer, _params: &[f32], ctx: &ProcessContext<'_>) {
        let channels = block.channels().min(MAX_CHANNELS);
        for i in 0..block.len() {
            let mut energy = 0.0_f64;
            for ch in 0..channels {
                let weighted = self.weighting[ch].process(block.samples[ch][i]) as f64;
                energy += weighted * weighted;
            }
            self.momentary.push(energy);
            self.short_term.push(energy);
        }

        let (momentary, short_term) = self.loudness();
        ctx.readout.set_loudness(momentary, short_term);
    }

    fn reset(&mut self) {
        self.weighting.iter_mut().for_each(KWeighting::reset);
        self.momentary.clear();
        self.short_term.clear();
    }
}
