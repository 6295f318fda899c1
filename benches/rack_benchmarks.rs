//! Rack Benchmarks
//!
//! Offline render and real-time block throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use sonic_rack::chain::{realtime_chain, render};
use sonic_rack::engine::io::generate_stereo_test_tone;
use sonic_rack::engine::{AudioBuffer, ChannelLayout, Playhead};
use sonic_rack::{EngineConfig, ModuleType, Rack};

fn mastering_rack() -> Rack {
    let mut rack = Rack::new();
    for module_type in [
        ModuleType::ParametricEq,
        ModuleType::Compressor,
        ModuleType::MultibandCompressor,
        ModuleType::StereoImager,
        ModuleType::Limiter,
        ModuleType::Dithering,
    ] {
        rack.add(module_type);
    }
    rack
}

fn benchmark_offline_render(c: &mut Criterion) {
    let buffer = generate_stereo_test_tone(440.0, 550.0, 10.0, 48000);
    let snapshot = mastering_rack().snapshot();

    c.bench_function("render_mastering_10s", |b| {
        b.iter(|| render(black_box(&buffer), &snapshot, 512).unwrap())
    });
}

fn benchmark_realtime_block(c: &mut Criterion) {
    let settings = EngineConfig::default().realtime_settings();
    let (mut controller, mut executor) = realtime_chain(settings, Arc::new(Playhead::default()));
    controller.set_topology(&mastering_rack().snapshot()).unwrap();

    let mut block = AudioBuffer::with_sample_rate(512, ChannelLayout::Stereo, 48000);
    for (i, s) in block.channel_mut(0).iter_mut().enumerate() {
        *s = (i as f32 * 0.05).sin() * 0.5;
    }

    c.bench_function("realtime_block_512", |b| {
        b.iter(|| executor.process_block(black_box(&mut block)))
    });
}

criterion_group!(benches, benchmark_offline_render, benchmark_realtime_block);
criterion_main!(benches);
