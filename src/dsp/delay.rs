//! Feedback delay
//!
//! Interpolated delay line of up to two seconds per channel. The delayed
//! signal is fed back into the line scaled by `feedback` (at most 0.95, so the
//! tail always decays).

use super::filters::DelayLine;
use super::processor::{mix, ProcessContext, Processor, MAX_CHANNELS};
use crate::engine::buffer::AudioBuffer;

pub const DELAY_TIME: usize = 0;
pub const FEEDBACK: usize = 1;
pub const WET: usize = 2;

/// Longest delay in seconds
pub const MAX_DELAY_SECS: f32 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct FeedbackDelay {
    lines: [DelayLine; MAX_CHANNELS],
}

impl FeedbackDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for FeedbackDelay {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        self.lines = std::array::from_fn(|_| DelayLine::new(MAX_DELAY_SECS, sample_rate));
    }

    fn process(&mut self, block: &mut AudioBuffer, params: &[f32], ctx: &ProcessContext<'_>) {
        let delay = params[DELAY_TIME] * ctx.sample_rate;
        let feedback = params[FEEDBACK].min(0.95);
        let wet = params[WET];

        for (line, samples) in self.lines.iter_mut().zip(block.samples.iter_mut()) {
            for sample in samples.iter_mut() {
                let x = *sample;
                let delayed = line.read(delay);
                line.write(x + delayed * feedback);
                *sample = mix(x, delayed, wet);
            }
        }
    }

    fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
    }
}
