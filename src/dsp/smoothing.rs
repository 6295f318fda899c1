//! Parameter smoothing
//!
//! Continuous parameters glide toward their target with a one-pole response,
//! `value += (target - value) * (1 - exp(-dt / tau))`, evaluated once per
//! block. Discrete parameters (selectors, stage counts, bit depths) jump.

use super::registry::{ParamKind, ParameterDescriptor};

/// Default smoothing time constant in milliseconds
pub const DEFAULT_SMOOTHING_MS: f32 = 10.0;

/// Distance at which a smoothed value snaps onto its target
pub const SNAP_EPSILON: f32 = 1e-6;

/// One-pole smoothing coefficient for a step of `dt_secs` with time constant `tau_secs`
///
/// A non-positive time constant means no smoothing (coefficient 1).
#[inline]
pub fn smoothing_coeff(tau_secs: f32, dt_secs: f32) -> f32 {
    if tau_secs <= 0.0 {
        return 1.0;
    }
    1.0 - (-dt_secs / tau_secs).exp()
}

/// Smoothed parameter values for one module instance, in descriptor order
#[derive(Debug, Clone)]
pub struct ParamSmoother {
    values: Vec<f32>,
    targets: Vec<f32>,
    discrete: Vec<bool>,
    tau_secs: f32,
    sample_rate: f32,
    block_frames: usize,
    coeff: f32,
}

impl ParamSmoother {
    /// Start at `initial`, already settled
    pub fn new(descriptors: &[ParameterDescriptor], initial: &[f32], tau_ms: f32) -> Self {
        let values: Vec<f32> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| initial.get(i).copied().unwrap_or(d.default))
            .collect();
        Self {
            targets: values.clone(),
            values,
            discrete: descriptors
                .iter()
                .map(|d| d.kind == ParamKind::Discrete)
                .collect(),
            tau_secs: tau_ms.max(0.0) / 1000.0,
            sample_rate: 0.0,
            block_frames: 0,
            coeff: 1.0,
        }
    }

    /// Recompute the coefficient if the sample rate or block length changed
    pub fn configure(&mut self, sample_rate: f32, block_frames: usize) {
        if sample_rate == self.sample_rate && block_frames == self.block_frames {
            return;
        }
        self.sample_rate = sample_rate;
        self.block_frames = block_frames;
        let dt = if sample_rate > 0.0 {
            block_frames as f32 / sample_rate
        } else {
            0.0
        };
        self.coeff = smoothing_coeff(self.tau_secs, dt);
    }

    pub fn set_time_constant(&mut self, tau_ms: f32) {
        self.tau_secs = tau_ms.max(0.0) / 1000.0;
        // force recalculation on next configure()
        self.block_frames = 0;
    }

    /// Set a new target; discrete parameters take it immediately
    pub fn set_target(&mut self, index: usize, target: f32) {
        let Some(slot) = self.targets.get_mut(index) else {
            return;
        };
        *slot = target;
        if self.discrete[index] {
            self.values[index] = target;
        }
    }

    /// Carry on gliding from where `previous` stands
    ///
    /// Used when a rebuilt chain keeps a module: only current values move over,
    /// targets stay as built. Mismatched shapes are ignored.
    pub fn continue_from(&mut self, previous: &ParamSmoother) {
        if previous.values.len() == self.values.len() {
            self.values.copy_from_slice(&previous.values);
            for (i, discrete) in self.discrete.iter().enumerate() {
                if *discrete {
                    self.values[i] = self.targets[i];
                }
            }
        }
    }

    /// Jump every value onto its target
    pub fn snap(&mut self) {
        self.values.copy_from_slice(&self.targets);
    }

    /// Advance one block
    pub fn advance(&mut self) {
        let coeff = self.coeff;
        for (value, &target) in self.values.iter_mut().zip(&self.targets) {
            let diff = target - *value;
            if diff.abs() <= SNAP_EPSILON {
                *value = target;
            } else {
                *value += diff * coeff;
            }
        }
    }

    /// Current values, in descriptor order
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn is_settled(&self) -> bool {
        self.values == self.targets
    }

    /// Precomputed per-block coefficient
    pub fn coeff(&self) -> f32 {
        self.coeff
    }
}
