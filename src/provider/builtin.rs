//! In-process provider
//!
//! Implements loudness normalization, mono bass and clipping repair directly.
//! Phase fixing and denoise need an external engine and report an
//! unsupported-operation error.

use tracing::debug;

use super::DspProvider;
use crate::dsp::filters::LinkwitzRiley4;
use crate::engine::buffer::AudioBuffer;
use crate::error::{RackError, Result};
use crate::metering::loudness::integrated_loudness;
use crate::metering::METER_FLOOR_DB;

/// Magnitude at or above which a sample counts as clipped
pub const CLIP_THRESHOLD: f32 = 0.99;

/// Clipped runs longer than this are left alone
pub const MAX_REPAIR_RUN: usize = 2048;

const MIN_MONO_BASS_HZ: f32 = 20.0;
const MAX_MONO_BASS_HZ: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinProvider;

impl BuiltinProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DspProvider for BuiltinProvider {
    fn name(&self) -> &str {
        "builtin"
    }

    /// Apply one static gain so integrated loudness lands on `target_lufs`
    fn normalize_loudness(&mut self, mut buffer: AudioBuffer, target_lufs: f32) -> Result<AudioBuffer> {
        buffer.validate()?;
        if !target_lufs.is_finite() {
            return Err(RackError::provider("loudness target is not a number"));
        }
        let integrated = integrated_loudness(&buffer);
        if integrated <= METER_FLOOR_DB {
            return Err(RackError::provider(
                "cannot normalize: audio is silent below the loudness gate",
            ));
        }
        let gain_db = target_lufs - integrated;
        debug!(integrated, target_lufs, gain_db, "normalizing loudness");
        buffer.apply_gain(gain_db);
        Ok(buffer)
    }

    fn fix_phase(&mut self, _buffer: AudioBuffer) -> Result<AudioBuffer> {
        Err(unsupported("fix-phase"))
    }

    /// Redraw clipped runs with a cubic that continues the slopes on either side
    fn repair_clipping(&mut self, mut buffer: AudioBuffer) -> Result<AudioBuffer> {
        buffer.validate()?;
        let mut repaired = 0;
        for channel in &mut buffer.samples {
            repaired += repair_channel(channel);
        }
        debug!(repaired, "clipped runs repaired");
        Ok(buffer)
    }

    fn denoise(&mut self, _buffer: AudioBuffer) -> Result<AudioBuffer> {
        Err(unsupported("denoise"))
    }

    /// Fold everything below `cutoff_hz` to mono; mono input passes through
    fn mono_bass(&mut self, mut buffer: AudioBuffer, cutoff_hz: f32) -> Result<AudioBuffer> {
        buffer.validate()?;
        let sample_rate = buffer.sample_rate as f32;
        let cutoff = cutoff_hz
            .min(MAX_MONO_BASS_HZ)
            .min(sample_rate / 2.1)
            .max(MIN_MONO_BASS_HZ);

        if let Some((left, right)) = buffer.stereo_mut() {
            let mut splits = [LinkwitzRiley4::default(), LinkwitzRiley4::default()];
            for split in &mut splits {
                split.set_cutoff(sample_rate, cutoff);
            }
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let (low_l, high_l) = splits[0].split(*l);
                let (low_r, high_r) = splits[1].split(*r);
                let low = 0.5 * (low_l + low_r);
                *l = low + high_l;
                *r = low + high_r;
            }
            debug!(cutoff, "bass folded to mono");
        }
        Ok(buffer)
    }
}

fn unsupported(operation: &str) -> RackError {
    RackError::provider(format!(
        "{} is not supported by the builtin provider",
        operation
    ))
}

/// Replace every interior clipped run; returns how many runs were redrawn
fn repair_channel(samples: &mut [f32]) -> usize {
    let len = samples.len();
    let mut repaired = 0;
    let mut i = 0;
    while i < len {
        if samples[i].abs() < CLIP_THRESHOLD {
            i += 1;
            continue;
        }
        let start = i;
        while i < len && samples[i].abs() >= CLIP_THRESHOLD {
            i += 1;
        }
        let end = i;
        // need two clean samples on each side
        if start >= 2 && end + 1 < len && end - start <= MAX_REPAIR_RUN {
            redraw(samples, start, end);
            repaired += 1;
        }
    }
    repaired
}

/// Cubic Hermite from `start - 1` to `end`, with end slopes taken from the
/// neighbouring clean samples
fn redraw(samples: &mut [f32], start: usize, end: usize) {
    let p0 = samples[start - 1];
    let p1 = samples[end];
    let m0 = p0 - samples[start - 2];
    let m1 = samples[end + 1] - p1;
    let span = (end - start + 1) as f32;

    for (k, sample) in samples[start..end].iter_mut().enumerate() {
        let t = (k + 1) as f32 / span;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        *sample = h00 * p0 + h10 * span * m0 + h01 * p1 + h11 * span * m1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::io::generate_stereo_test_tone;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_hits_target() {
        let mut buffer = generate_stereo_test_tone(1000.0, 1000.0, 3.0, 48000);
        buffer.apply_gain(-20.0);
        let out = BuiltinProvider::new().normalize_loudness(buffer, -14.0).unwrap();
        assert_abs_diff_eq!(integrated_loudness(&out), -14.0, epsilon = 0.05);
    }

    #[test]
    fn test_normalize_rejects_silence() {
        let buffer = AudioBuffer::new(48000, ChannelLayout::Stereo);
        let err = BuiltinProvider::new().normalize_loudness(buffer, -14.0).unwrap_err();
        assert!(matches!(err, RackError::Provider { .. }));
    }

    #[test]
    fn test_unsupported_operations() {
        let buffer = generate_stereo_test_tone(100.0, 100.0, 0.1, 48000);
        let mut provider = BuiltinProvider::new();
        let err = provider.fix_phase(buffer.clone()).unwrap_err();
        assert!(err.to_string().contains("fix-phase"));
        assert!(provider.denoise(buffer).is_err());
    }

    #[test]
    fn test_mono_bass_cancels_out_of_phase_lows() {
        let mut buffer = generate_stereo_test_tone(50.0, 50.0, 1.0, 48000);
        for s in buffer.channel_mut(1) {
            *s = -*s;
        }
        let out = BuiltinProvider::new().mono_bass(buffer, 200.0).unwrap();
        let tail_peak = out.channel(0)[24000..]
            .iter()
            .fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 0.1, "residual {}", tail_peak);
    }

    #[test]
    fn test_mono_bass_keeps_highs_and_mono() {
        let mut buffer = generate_stereo_test_tone(5000.0, 5000.0, 0.5, 48000);
        for s in buffer.channel_mut(1) {
            *s = -*s;
        }
        let out = BuiltinProvider::new().mono_bass(buffer, 120.0).unwrap();
        let tail_peak = out.channel(1)[12000..]
            .iter()
            .fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(tail_peak > 0.9, "high band lost: {}", tail_peak);

        let mono = crate::engine::io::generate_test_tone(60.0, 0.1, 48000);
        let passed = BuiltinProvider::new().mono_bass(mono.clone(), 120.0).unwrap();
        assert_eq!(passed, mono);
    }

    #[test]
    fn test_repair_clipping_restores_peaks() {
        let clean: Vec<f32> = (0..4800)
            .map(|i| 1.3 * (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        let clipped: Vec<f32> = clean.iter().map(|s| s.clamp(-1.0, 1.0)).collect();
        let buffer = AudioBuffer::from_channels(vec![clipped.clone()], 48000).unwrap();

        let out = BuiltinProvider::new().repair_clipping(buffer).unwrap();
        let repaired = out.channel(0);
        assert!(out.peak() > 1.1, "peak {}", out.peak());

        let error = |a: &[f32]| -> f32 { a.iter().zip(&clean).map(|(x, y)| (x - y).abs()).sum() };
        assert!(error(repaired) < error(&clipped) * 0.5);
    }

    #[test]
    fn test_repair_leaves_clean_audio_alone() {
        let buffer = generate_stereo_test_tone(440.0, 440.0, 0.1, 48000);
        let mut quiet = buffer.clone();
        quiet.apply_gain(-6.0);
        let out = BuiltinProvider::new().repair_clipping(quiet.clone()).unwrap();
        assert_eq!(out, quiet);
    }

    #[test]
    fn test_edge_runs_are_kept() {
        let mut samples = vec![1.0, 1.0, 0.5, 0.2, 0.1, -1.0];
        assert_eq!(repair_channel(&mut samples), 0);
        assert_eq!(samples, vec![1.0, 1.0, 0.5, 0.2, 0.1, -1.0]);
    }
}
