//! Mixer hot-path benchmarks: full callbacks rendered through a headless
//! engine, and the SIMD kernels in isolation.

use criterion::{criterion_group, criterion_main, Criterion};
use mixcore::audio::simd;
use mixcore::{AudioEngine, CompressionMode, EngineConfig};
use std::io::Cursor;

fn dc_wav(frames: usize, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames * 2 {
            writer.write_sample(amplitude).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn engine_with_voices(count: usize) -> AudioEngine {
    let engine = AudioEngine::new(EngineConfig {
        enable_output: false,
        ..EngineConfig::default()
    });
    engine.initialize().unwrap();

    for _ in 0..count {
        let handle = engine
            .load(dc_wav(44100, 0.1), CompressionMode::CompressInMemory)
            .unwrap();
        engine.set_loop(handle, true).unwrap();
        engine.play(handle).unwrap();
    }
    engine
}

fn bench_callback(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback");

    for voices in [1usize, 8, 32] {
        let engine = engine_with_voices(voices);
        let mut output = vec![0.0f32; 512 * 2];

        group.bench_function(format!("render_512f_{voices}v"), |b| {
            b.iter(|| engine.render(&mut output, 2));
        });
    }

    group.finish();
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");

    let src = vec![0.25f32; 1024];
    let mut dst = vec![0.0f32; 1024];

    group.bench_function("mix_add_1024", |b| {
        b.iter(|| simd::mix_add(&mut dst, &src, 0.5));
    });

    group.bench_function("peak_level_1024", |b| {
        b.iter(|| simd::peak_level(&dst));
    });

    group.bench_function("apply_gain_1024", |b| {
        b.iter(|| simd::apply_gain(&mut dst, 0.99));
    });

    group.finish();
}

criterion_group!(benches, bench_callback, bench_kernels);
criterion_main!(benches);
