//! Whole-buffer loudness analysis and streaming-platform compliance
//!
//! Integrated loudness follows the BS.1770 gating scheme: K-weighted energy in
//! 400 ms blocks with 75% overlap, an absolute gate at -70 LUFS, then a
//! relative gate 10 LU below the loudness of the blocks that passed. True peak
//! is estimated from a 4x linearly interpolated signal.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::METER_FLOOR_DB;
use crate::dsp::filters::KWeighting;
use crate::engine::buffer::AudioBuffer;

/// BS.1770 offset between mean-square energy in dB and LUFS
pub const LUFS_OFFSET: f64 = -0.691;

const BLOCK_SECS: f64 = 0.4;
const HOP_SECS: f64 = 0.1;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;
const TRUE_PEAK_OVERSAMPLING: usize = 4;

/// Mean-square energy to LUFS, floored at [`METER_FLOOR_DB`]
#[inline]
pub fn energy_to_lufs(mean_square: f64) -> f32 {
    if mean_square > 0.0 {
        ((10.0 * mean_square.log10() + LUFS_OFFSET) as f32).max(METER_FLOOR_DB)
    } else {
        METER_FLOOR_DB
    }
}

#[inline]
fn lufs_to_energy(lufs: f64) -> f64 {
    10.0_f64.powf((lufs - LUFS_OFFSET) / 10.0)
}

/// Gated integrated loudness of a whole buffer in LUFS
pub fn integrated_loudness(buffer: &AudioBuffer) -> f32 {
    let frames = buffer.len();
    if frames == 0 {
        return METER_FLOOR_DB;
    }
    let sr = buffer.sample_rate as f64;

    // per-frame K-weighted energy summed over channels
    let mut energy = vec![0.0_f64; frames];
    for ch in 0..buffer.channels() {
        let mut weighting = KWeighting::new(buffer.sample_rate as f32);
        for (e, &x) in energy.iter_mut().zip(buffer.channel(ch)) {
            let y = weighting.process(x) as f64;
            *e += y * y;
        }
    }

    let block = ((BLOCK_SECS * sr) as usize).clamp(1, frames);
    let hop = ((HOP_SECS * sr) as usize).max(1);
    let mut blocks = Vec::new();
    let mut start = 0;
    while start + block <= frames {
        let sum: f64 = energy[start..start + block].iter().sum();
        blocks.push(sum / block as f64);
        start += hop;
    }

    let absolute = lufs_to_energy(ABSOLUTE_GATE_LUFS);
    let above_absolute: Vec<f64> = blocks.into_iter().filter(|&e| e > absolute).collect();
    if above_absolute.is_empty() {
        return METER_FLOOR_DB;
    }
    let ungated_mean = above_absolute.iter().sum::<f64>() / above_absolute.len() as f64;

    let relative = ungated_mean * 10.0_f64.powf(RELATIVE_GATE_LU / 10.0);
    let gated: Vec<f64> = above_absolute.into_iter().filter(|&e| e > relative).collect();
    if gated.is_empty() {
        return METER_FLOOR_DB;
    }
    energy_to_lufs(gated.iter().sum::<f64>() / gated.len() as f64)
}

/// Peak of the 4x linearly interpolated signal in dBTP
pub fn true_peak(buffer: &AudioBuffer) -> f32 {
    let mut peak = 0.0_f32;
    for samples in &buffer.samples {
        for pair in samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            for k in 0..TRUE_PEAK_OVERSAMPLING {
                let t = k as f32 / TRUE_PEAK_OVERSAMPLING as f32;
                peak = peak.max((a + (b - a) * t).abs());
            }
        }
        if let Some(last) = samples.last() {
            peak = peak.max(last.abs());
        }
    }
    if peak > 0.0 {
        (20.0 * peak.log10()).max(METER_FLOOR_DB)
    } else {
        METER_FLOOR_DB
    }
}

// ============================================================================
// Platform Compliance
// ============================================================================

/// Streaming platforms with published loudness targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Spotify,
    Youtube,
    AppleMusic,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Spotify, Platform::Youtube, Platform::AppleMusic];

    /// Target integrated loudness in LUFS
    pub fn target_lufs(self) -> f32 {
        match self {
            Platform::Spotify | Platform::Youtube => -14.0,
            Platform::AppleMusic => -16.0,
        }
    }

    /// True-peak ceiling in dBTP
    pub fn true_peak_limit(self) -> f32 {
        -1.0
    }

    /// Gain (dB, never positive) the platform would apply to this material
    ///
    /// The stricter of the loudness and true-peak constraints wins; quiet
    /// material is never boosted.
    pub fn penalty(self, integrated_lufs: f32, true_peak_db: f32) -> f32 {
        (self.target_lufs() - integrated_lufs)
            .min(self.true_peak_limit() - true_peak_db)
            .min(0.0)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Spotify => write!(f, "Spotify"),
            Platform::Youtube => write!(f, "YouTube"),
            Platform::AppleMusic => write!(f, "Apple Music"),
        }
    }
}

/// Penalty per platform, in dB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub spotify: f32,
    pub youtube: f32,
    pub apple_music: f32,
}

impl ComplianceReport {
    pub fn new(integrated_lufs: f32, true_peak_db: f32) -> Self {
        Self {
            spotify: Platform::Spotify.penalty(integrated_lufs, true_peak_db),
            youtube: Platform::Youtube.penalty(integrated_lufs, true_peak_db),
            apple_music: Platform::AppleMusic.penalty(integrated_lufs, true_peak_db),
        }
    }

    pub fn get(&self, platform: Platform) -> f32 {
        match platform {
            Platform::Spotify => self.spotify,
            Platform::Youtube => self.youtube,
            Platform::AppleMusic => self.apple_music,
        }
    }

    /// True when no platform would turn the material down
    pub fn is_compliant(&self) -> bool {
        Platform::ALL.iter().all(|p| self.get(*p) == 0.0)
    }
}

/// Loudness figures for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessAnalysis {
    pub integrated_lufs: f32,
    pub true_peak_db: f32,
    pub compliance: ComplianceReport,
}

impl LoudnessAnalysis {
    pub fn analyze(buffer: &AudioBuffer) -> Self {
        let integrated_lufs = integrated_loudness(buffer);
        let true_peak_db = true_peak(buffer);
        Self {
            integrated_lufs,
            true_peak_db,
            compliance: ComplianceReport::new(integrated_lufs, true_peak_db),
        }
    }
}
