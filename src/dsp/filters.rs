//! Shared DSP building blocks
//!
//! RBJ cookbook biquads, Linkwitz-Riley crossovers, envelope followers,
//! interpolated delay lines, LFOs, one-pole all-passes, and the BS.1770
//! K-weighting pre-filter. All of these are per-channel and allocation-free
//! once constructed.

use std::f64::consts::PI;

// ============================================================================
// Biquad
// ============================================================================

/// Filter shapes supported by [`Biquad`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Bell curve boost/cut
    #[default]
    Peak,
    LowShelf,
    HighShelf,
    LowPass,
    HighPass,
    /// Constant 0 dB peak gain band-pass
    BandPass,
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BiquadCoeffs {
    pub const IDENTITY: BiquadCoeffs = BiquadCoeffs {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Calculate coefficients with the Audio EQ Cookbook formulas
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        if sample_rate <= 0.0 {
            return Self::IDENTITY;
        }
        // keep the corner strictly inside (0, Nyquist)
        let freq = frequency.clamp(10.0, sample_rate * 0.49);
        let q = q.clamp(0.05, 50.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::BandPass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// One channel of a direct-form-I biquad
///
/// Coefficients are only recomputed when the design parameters change. A
/// non-finite output clears the state and yields silence for that sample.
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    design: Option<(FilterType, f32, f32, f32, f32)>,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(
        filter_type: FilterType,
        sample_rate: f32,
        frequency: f32,
        gain_db: f32,
        q: f32,
    ) -> Self {
        let mut filter = Self::default();
        filter.set(filter_type, sample_rate, frequency, gain_db, q);
        filter
    }

    /// Update the design; cheap when nothing changed
    #[inline]
    pub fn set(
        &mut self,
        filter_type: FilterType,
        sample_rate: f32,
        frequency: f32,
        gain_db: f32,
        q: f32,
    ) {
        let design = (filter_type, sample_rate, frequency, gain_db, q);
        if self.design == Some(design) {
            return;
        }
        self.design = Some(design);
        self.coeffs = BiquadCoeffs::calculate(
            filter_type,
            sample_rate as f64,
            frequency as f64,
            gain_db as f64,
            q as f64,
        );
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        if !y.is_finite() {
            self.reset();
            return 0.0;
        }

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// Linkwitz-Riley Crossover
// ============================================================================

const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Fourth-order Linkwitz-Riley split: two cascaded Butterworth sections per band
///
/// Low and high outputs are -6 dB at the cutoff and sum to an all-pass.
#[derive(Debug, Clone, Default)]
pub struct LinkwitzRiley4 {
    lp: [Biquad; 2],
    hp: [Biquad; 2],
}

impl LinkwitzRiley4 {
    pub fn set_cutoff(&mut self, sample_rate: f32, frequency: f32) {
        for f in &mut self.lp {
            f.set(FilterType::LowPass, sample_rate, frequency, 0.0, BUTTERWORTH_Q);
        }
        for f in &mut self.hp {
            f.set(FilterType::HighPass, sample_rate, frequency, 0.0, BUTTERWORTH_Q);
        }
    }

    /// Returns (low, high)
    #[inline]
    pub fn split(&mut self, input: f32) -> (f32, f32) {
        let low = self.lp[0].process(input);
        let low = self.lp[1].process(low);
        let high = self.hp[0].process(input);
        let high = self.hp[1].process(high);
        (low, high)
    }

    pub fn reset(&mut self) {
        self.lp.iter_mut().chain(self.hp.iter_mut()).for_each(Biquad::reset);
    }
}

/// Low / mid / high split from two LR4 crossovers
#[derive(Debug, Clone, Default)]
pub struct ThreeBandSplit {
    low_cross: LinkwitzRiley4,
    high_cross: LinkwitzRiley4,
}

impl ThreeBandSplit {
    pub fn set_cutoffs(&mut self, sample_rate: f32, low_freq: f32, high_freq: f32) {
        self.low_cross.set_cutoff(sample_rate, low_freq);
        self.high_cross.set_cutoff(sample_rate, high_freq.max(low_freq));
    }

    /// Returns (low, mid, high)
    #[inline]
    pub fn split(&mut self, input: f32) -> (f32, f32, f32) {
        let (low, rest) = self.low_cross.split(input);
        let (mid, high) = self.high_cross.split(rest);
        (low, mid, high)
    }

    pub fn reset(&mut self) {
        self.low_cross.reset();
        self.high_cross.reset();
    }
}

// ============================================================================
// Envelope Follower
// ============================================================================

/// Minimum attack/release time for [`EnvelopeFollower`]
const MIN_ENVELOPE_TIME: f32 = 0.001;

/// One-pole time-constant coefficient, `exp(-1 / (seconds * sample_rate))`
#[inline]
pub fn time_to_coeff(seconds: f32, sample_rate: f32) -> f32 {
    let samples = seconds * sample_rate;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Peak envelope follower with separate attack and release
#[derive(Debug, Clone, Default)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    /// Times in seconds; both are floored at 1 ms
    pub fn set_times(&mut self, attack: f32, release: f32, sample_rate: f32) {
        self.attack_coeff = time_to_coeff(attack.max(MIN_ENVELOPE_TIME), sample_rate);
        self.release_coeff = time_to_coeff(release.max(MIN_ENVELOPE_TIME), sample_rate);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let level = input.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        self.envelope
    }

    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

// ============================================================================
// Delay Line
// ============================================================================

/// Circular delay line with linear-interpolated fractional reads
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_index: usize,
}

impl DelayLine {
    /// Allocate for up to `max_delay_secs` at `sample_rate`
    pub fn new(max_delay_secs: f32, sample_rate: f32) -> Self {
        let size = ((max_delay_secs * sample_rate).ceil() as usize).max(1) + 2;
        Self {
            buffer: vec![0.0; size],
            write_index: 0,
        }
    }

    /// Longest delay that can be read back, in samples
    pub fn capacity(&self) -> usize {
        self.buffer.len().saturating_sub(2)
    }

    #[inline]
    pub fn write(&mut self, input: f32) {
        if self.buffer.is_empty() {
            return;
        }
        self.buffer[self.write_index] = input;
        self.write_index = (self.write_index + 1) % self.buffer.len();
    }

    /// Read the sample written `delay_samples` writes ago
    ///
    /// A delay of 1 returns the most recent write. Delays are clamped to
    /// `[1, capacity]`.
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let size = self.buffer.len();
        if size == 0 {
            return 0.0;
        }
        let delay = delay_samples.clamp(1.0, self.capacity().max(1) as f32);
        let mut read_pos = self.write_index as f32 - delay;
        if read_pos < 0.0 {
            read_pos += size as f32;
        }

        let i = read_pos.floor();
        let frac = read_pos - i;
        let i1 = (i as usize) % size;
        let i2 = (i1 + 1) % size;
        let s1 = self.buffer[i1];
        let s2 = self.buffer[i2];
        s1 + frac * (s2 - s1)
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
    }
}

// ============================================================================
// LFO
// ============================================================================

const TWO_PI: f32 = 2.0 * std::f32::consts::PI;

/// LFO wave shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
}

impl Waveform {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Waveform::Triangle,
            2 => Waveform::Saw,
            3 => Waveform::Square,
            _ => Waveform::Sine,
        }
    }

    /// Value in [-1, 1] at `phase` radians
    #[inline]
    pub fn at(self, phase: f32) -> f32 {
        let phase = phase.rem_euclid(TWO_PI);
        let t = phase / TWO_PI;
        match self {
            Waveform::Sine => phase.sin(),
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
            Waveform::Saw => 2.0 * t - 1.0,
            Waveform::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Phase accumulator in radians
#[derive(Debug, Clone, Default)]
pub struct Lfo {
    phase: f32,
}

impl Lfo {
    pub fn with_phase(phase: f32) -> Self {
        Self {
            phase: phase.rem_euclid(TWO_PI),
        }
    }

    /// Advance by one sample and return the new phase
    #[inline]
    pub fn advance(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        self.phase += TWO_PI * frequency / sample_rate;
        if self.phase >= TWO_PI {
            self.phase -= TWO_PI;
        }
        self.phase
    }

    /// Advance and return a sine value
    #[inline]
    pub fn sine(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        self.advance(frequency, sample_rate).sin()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset_to(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(TWO_PI);
    }
}

// ============================================================================
// One-Pole All-Pass
// ============================================================================

/// First-order all-pass, `y = a*x + x1 - a*y1`
#[derive(Debug, Clone, Copy, Default)]
pub struct OnePoleAllPass {
    x1: f32,
    y1: f32,
}

impl OnePoleAllPass {
    #[inline]
    pub fn process(&mut self, input: f32, alpha: f32) -> f32 {
        let output = alpha * input + self.x1 - alpha * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// All-pass coefficient placing the 90-degree point at `frequency`
#[inline]
pub fn allpass_alpha(frequency: f32, sample_rate: f32) -> f32 {
    let f = frequency.clamp(20.0, sample_rate / 2.1);
    let t = (std::f32::consts::PI * f / sample_rate).tan();
    (t - 1.0) / (t + 1.0)
}

// ============================================================================
// K-Weighting
// ============================================================================

/// BS.1770 style pre-filter: +4 dB high shelf at 1.5 kHz, then a 100 Hz high-pass
#[derive(Debug, Clone, Default)]
pub struct KWeighting {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            shelf: Biquad::new(FilterType::HighShelf, sample_rate, 1500.0, 4.0, 0.707),
            highpass: Biquad::new(FilterType::HighPass, sample_rate, 100.0, 0.0, 1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.highpass.process(self.shelf.process(input))
    }

    pub fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}
