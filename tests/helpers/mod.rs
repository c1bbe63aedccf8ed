//! Shared test helpers: in-memory WAV synthesis and headless engine setup.
#![allow(dead_code)]

use mixcore::{AudioEngine, EngineConfig};
use std::io::Cursor;

/// Stereo 32-bit-float WAV at 44.1 kHz holding a DC signal.
pub fn dc_wav_f32(frames: usize, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    write_wav(spec, |writer| {
        for _ in 0..frames * 2 {
            writer.write_sample(amplitude).unwrap();
        }
    })
}

/// Mono 32-bit-float WAV at 44.1 kHz holding a DC signal.
pub fn dc_wav_f32_mono(frames: usize, amplitude: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    write_wav(spec, |writer| {
        for _ in 0..frames {
            writer.write_sample(amplitude).unwrap();
        }
    })
}

/// Stereo 16-bit WAV at 44.1 kHz with a deterministic ramp payload.
pub fn ramp_wav_16bit(frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    write_wav(spec, |writer| {
        for i in 0..frames * 2 {
            writer.write_sample(((i % 1000) * 32) as i16).unwrap();
        }
    })
}

fn write_wav<F>(spec: hound::WavSpec, fill: F) -> Vec<u8>
where
    F: FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>),
{
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        fill(&mut writer);
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// An initialized engine with no output device; tests drive `render`
/// directly.
pub fn headless_engine() -> AudioEngine {
    headless_engine_with(|_| {})
}

/// Headless engine with config tweaks applied before initialize.
pub fn headless_engine_with(tweak: impl FnOnce(&mut EngineConfig)) -> AudioEngine {
    let mut config = EngineConfig {
        enable_output: false,
        ..EngineConfig::default()
    };
    tweak(&mut config);

    let engine = AudioEngine::new(config);
    engine.initialize().expect("engine initialize");
    engine
}
