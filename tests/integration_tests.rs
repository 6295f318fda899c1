//! Integration Tests
//!
//! End-to-end checks of the rack model, offline rendering and the session.

use std::fs;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use test_case::test_case;

use sonic_rack::chain::render;
use sonic_rack::engine::io::{export_audio, generate_stereo_test_tone, import_audio, ExportFormat};
use sonic_rack::metering::ComplianceReport;
use sonic_rack::{AudioBuffer, EngineConfig, ModuleType, Platform, Rack, Session};

/// Stereo program material with some level variation
fn program(duration_secs: f32) -> AudioBuffer {
    let mut buffer = generate_stereo_test_tone(220.0, 330.0, duration_secs, 48000);
    let len = buffer.len();
    for ch in 0..2 {
        for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
            *s *= 0.2 + 0.7 * (i as f32 / len as f32);
        }
    }
    buffer
}

// === Rack Model ===

#[test]
fn test_every_parameter_is_clamped() {
    let mut rack = Rack::new();
    for module_type in ModuleType::ALL {
        let id = rack.add(module_type);
        for param in module_type.descriptor().params {
            for value in [f32::NEG_INFINITY, -1.0e6, param.min, param.max, 1.0e6, f32::NAN] {
                let stored = rack.update_param(&id, param.name, value).unwrap().unwrap();
                assert!(
                    (param.min..=param.max).contains(&stored),
                    "{}.{} stored {} for {}",
                    module_type,
                    param.name,
                    stored,
                    value
                );
            }
        }
    }
}

#[test]
fn test_reorder_is_a_permutation() {
    let mut rack = Rack::new();
    let ids: Vec<String> = [
        ModuleType::Compressor,
        ModuleType::ParametricEq,
        ModuleType::Saturation,
        ModuleType::StereoImager,
        ModuleType::Limiter,
    ]
    .into_iter()
    .map(|t| rack.add(t))
    .collect();

    for (from, to) in [(0, 4), (4, 0), (1, 3), (2, 2)] {
        let before = rack.ids();
        rack.reorder(from, to).unwrap();
        let after = rack.ids();

        let mut sorted_before = before.clone();
        let mut sorted_after = after.clone();
        sorted_before.sort();
        sorted_after.sort();
        assert_eq!(sorted_before, sorted_after);

        assert_eq!(after[to], before[from]);
        let others_before: Vec<_> = before.iter().filter(|id| **id != before[from]).collect();
        let others_after: Vec<_> = after.iter().filter(|id| **id != before[from]).collect();
        assert_eq!(others_before, others_after);
    }
    assert_eq!(rack.len(), ids.len());
}

#[test]
fn test_reorder_example() {
    let mut rack = Rack::new();
    let a = rack.add(ModuleType::Compressor);
    let b = rack.add(ModuleType::Limiter);
    let c = rack.add(ModuleType::Dithering);
    rack.reorder(0, 2).unwrap();
    assert_eq!(rack.ids(), vec![b, c, a]);
}

#[test]
fn test_add_then_remove_restores_order() {
    let mut rack = Rack::new();
    rack.add(ModuleType::ParametricEq);
    rack.add(ModuleType::Compressor);
    let before = rack.ids();

    let id = rack.add(ModuleType::Chorus);
    assert!(rack.remove_module(&id));
    assert_eq!(rack.ids(), before);
}

// === DSP Properties ===

#[test]
fn test_bypassed_rack_is_identity() {
    let input = program(0.5);
    let mut rack = Rack::new();
    for module_type in ModuleType::ALL {
        let id = rack.add(module_type);
        for param in module_type.descriptor().params {
            rack.update_param(&id, param.name, param.max).unwrap();
        }
        rack.set_bypass(&id, true);
    }

    let output = render(&input, &rack.snapshot(), 512).unwrap();
    assert_eq!(output.buffer, input);
    assert_eq!(output.latency_samples, 0);
}

#[test_case(1.0, 0.0, 0.0 ; "soft clip unity")]
#[test_case(100.0, 1.0, 24.0 ; "hard clip hot")]
#[test_case(50.0, 2.0, -24.0 ; "fold quiet")]
fn test_distortion_dry_is_identity(drive: f32, kind: f32, output_gain: f32) {
    let input = program(0.25);
    let mut rack = Rack::new();
    let id = rack.add(ModuleType::Distortion);
    rack.update_param(&id, "wet", 0.0).unwrap();
    rack.update_param(&id, "drive", drive).unwrap();
    rack.update_param(&id, "type", kind).unwrap();
    rack.update_param(&id, "outputGain", output_gain).unwrap();

    let output = render(&input, &rack.snapshot(), 256).unwrap();
    assert_eq!(output.buffer, input);
}

#[test]
fn test_one_bit_crusher_quantizes_every_sample() {
    let input = program(0.25);
    let mut rack = Rack::new();
    let id = rack.add(ModuleType::Bitcrusher);
    rack.update_param(&id, "bits", 1.0).unwrap();
    rack.update_param(&id, "normFreq", 1.0).unwrap();
    rack.update_param(&id, "mix", 1.0).unwrap();

    let output = render(&input, &rack.snapshot(), 512).unwrap();
    for ch in 0..2 {
        for (x, y) in input.channel(ch).iter().zip(output.buffer.channel(ch)) {
            assert_eq!(*y, (x * 2.0).floor() / 2.0);
        }
    }
}

#[test]
fn test_compliance_penalty_example() {
    let report = ComplianceReport::new(-14.0, -1.0);
    assert_eq!(report.get(Platform::Spotify), 0.0);
    assert_eq!(report.get(Platform::Youtube), 0.0);
    assert_abs_diff_eq!(report.get(Platform::AppleMusic), -2.0);
    assert!(!report.is_compliant());
}

// === Offline Rendering ===

#[test]
fn test_offline_render_is_deterministic() {
    let input = program(1.0);
    let mut rack = Rack::new();
    rack.add(ModuleType::Compressor);
    rack.add(ModuleType::Chorus);
    rack.add(ModuleType::FeedbackDelay);
    rack.add(ModuleType::Limiter);
    rack.add(ModuleType::Dithering);
    let snapshot = rack.snapshot();

    let first = render(&input, &snapshot, 512).unwrap();
    let second = render(&input, &snapshot, 512).unwrap();
    assert_eq!(first.buffer, second.buffer);
    assert_eq!(first.digest, second.digest);
    assert_ne!(first.buffer, input);
}

#[test]
fn test_render_file_round_trip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.wav");
    export_audio(&program(0.5), &source, ExportFormat::default()).unwrap();

    let mut rack = Rack::new();
    let id = rack.add(ModuleType::Saturation);
    rack.update_param(&id, "drive", 4.0).unwrap();
    rack.add(ModuleType::Limiter);
    let rack_json = dir.path().join("rack.json");
    fs::write(&rack_json, rack.to_json().unwrap()).unwrap();

    let output = dir.path().join("mastered.wav");
    sonic_rack::cli::commands::render_file(
        &EngineConfig::default(),
        &source,
        &output,
        Some(rack_json.as_path()),
        None,
    )
    .unwrap();

    let mastered = import_audio(&output).unwrap();
    assert_eq!(mastered.len(), import_audio(&source).unwrap().len());
    assert!(mastered.peak() <= 1.0);
}

// === Session ===

#[test]
fn test_session_export_matches_render() {
    let dir = tempdir().unwrap();
    let mut session = Session::new(EngineConfig::default()).unwrap();
    session.load_buffer(program(0.5)).unwrap();
    session.add(ModuleType::Compressor).unwrap();
    session.add(ModuleType::Limiter).unwrap();

    let expected = session.render().unwrap();
    let handle = session.export_audio(dir.path().join("out.wav")).unwrap();
    let result = session
        .wait_export_result(Duration::from_secs(30))
        .unwrap()
        .expect("export finished");

    assert_eq!(result.id, handle.id);
    let summary = result.outcome.unwrap();
    assert_eq!(summary.digest, expected.digest);
    assert_eq!(summary.frames, expected.buffer.len());
    assert!(dir.path().join("out.wav").exists());
}

#[test]
fn test_session_rack_survives_json() {
    let mut session = Session::new(EngineConfig::default()).unwrap();
    let id = session.add_module("de-esser").unwrap();
    session.update_param(&id, "frequency", 50_000.0).unwrap();
    session.toggle_bypass(&id).unwrap();
    let json = session.rack_json().unwrap();

    let mut restored = Session::new(EngineConfig::default()).unwrap();
    restored.load_rack_json(&json).unwrap();
    let module = restored.module(&id).unwrap();
    assert_eq!(module.param("frequency"), Some(10000.0));
    assert!(module.is_bypassed());
}
