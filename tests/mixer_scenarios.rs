//! End-to-end mixer scenarios driven through the engine facade.
//!
//! The engine runs headless: tests call `render` the way a platform output
//! driver would, one fixed-size buffer at a time.

mod helpers;

use helpers::{dc_wav_f32, dc_wav_f32_mono, headless_engine, headless_engine_with};
use mixcore::{CompressionMode, EventKind, PlaybackState};

#[test]
fn silence_when_nothing_plays() {
    let engine = headless_engine();

    let mut output = vec![99.0f32; 256];
    engine.render(&mut output, 2);

    assert!(output.iter().all(|&v| v == 0.0));
    assert_eq!(engine.peak_level(), 0.0);
}

#[test]
fn master_gain_scales_every_sample() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 0.8), CompressionMode::CompressInMemory)
        .unwrap();

    engine.set_master_volume(0.5);
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    // 0.8 * 1.0 * 0.5 = 0.4 on every sample
    for &sample in &output {
        assert!((sample - 0.4).abs() < 1e-3, "expected 0.4, got {sample}");
    }
}

#[test]
fn source_gain_scales_output() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 1.0), CompressionMode::CompressInMemory)
        .unwrap();

    engine.set_volume(handle, 0.25).unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    for &sample in &output {
        assert!((sample - 0.25).abs() < 1e-3);
    }
}

#[test]
fn source_gain_above_unity() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 0.25), CompressionMode::CompressInMemory)
        .unwrap();

    engine.set_volume(handle, 2.0).unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    assert!((output[0] - 0.5).abs() < 1e-3);
}

#[test]
fn peak_meter_reports_buffer_peak() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 0.75), CompressionMode::CompressInMemory)
        .unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    assert!((engine.peak_level() - 0.75).abs() < 1e-3);
}

#[test]
fn finished_voice_reported_on_second_callback() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(64, 0.5), CompressionMode::CompressInMemory)
        .unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 128];

    // First callback consumes the 64-frame clip exactly; nothing finishes
    engine.render(&mut output, 2);
    assert!(engine.poll_event().is_none());

    // Second callback hits EOS: exactly one VoiceFinished for our handle
    engine.render(&mut output, 2);
    let event = engine.poll_event().unwrap();
    assert_eq!(event.kind, EventKind::VoiceFinished);
    assert_eq!(event.voice, handle);
    assert!(engine.poll_event().is_none());

    assert_eq!(engine.get_state(handle).unwrap(), PlaybackState::Stopped);
}

#[test]
fn arena_is_used_and_matches_fallback_output() {
    let render_once = |engine: &mixcore::AudioEngine| {
        let handle = engine
            .load(dc_wav_f32(128, 1.0), CompressionMode::CompressInMemory)
            .unwrap();
        engine.set_volume(handle, 0.25).unwrap();
        engine.play(handle).unwrap();

        let mut output = vec![0.0f32; 256];
        engine.render(&mut output, 2);
        output
    };

    // 64 KiB arena serves the scratch buffer
    let arena_engine = headless_engine_with(|cfg| cfg.arena_capacity = 64 * 1024);
    let arena_output = render_once(&arena_engine);

    let stats = arena_engine.mixer_stats();
    assert!(stats.arena_used.load(std::sync::atomic::Ordering::Relaxed) > 0);
    assert_eq!(stats.arena_oom.load(std::sync::atomic::Ordering::Relaxed), 0);

    // A starved arena forces the heap fallback; output is identical
    let starved_engine = headless_engine_with(|cfg| cfg.arena_capacity = 32);
    let fallback_output = render_once(&starved_engine);

    let stats = starved_engine.mixer_stats();
    assert!(stats.arena_oom.load(std::sync::atomic::Ordering::Relaxed) > 0);
    assert_eq!(arena_output, fallback_output);
}

#[test]
fn mono_source_upmixes_to_both_channels() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32_mono(128, 0.5), CompressionMode::CompressInMemory)
        .unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    for frame in output.chunks_exact(2) {
        assert!((frame[0] - 0.5).abs() < 1e-3);
        assert!((frame[1] - 0.5).abs() < 1e-3);
    }
}

#[test]
fn pan_full_right_keeps_constant_power() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 1.0), CompressionMode::CompressInMemory)
        .unwrap();
    engine.set_pan(handle, 1.0).unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    assert!(output[0].abs() < 1e-4, "left must be silent at pan=+1");
    assert!((output[1] - 1.0).abs() < 1e-3, "right must pass at unity");
}

#[test]
fn looping_voice_survives_eos() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(100, 0.5), CompressionMode::CompressInMemory)
        .unwrap();
    engine.set_loop(handle, true).unwrap();
    engine.play(handle).unwrap();

    let mut output = vec![0.0f32; 128];
    for _ in 0..5 {
        engine.render(&mut output, 2);
        // The wrap keeps the buffer full of signal
        assert!((output[0] - 0.5).abs() < 1e-3);
        assert!((output[127] - 0.5).abs() < 1e-3);
    }

    assert_eq!(engine.get_state(handle).unwrap(), PlaybackState::Playing);

    // Loop points were reported, but never VoiceFinished
    let mut saw_loop = false;
    while let Some(event) = engine.poll_event() {
        assert_ne!(event.kind, EventKind::VoiceFinished);
        if event.kind == EventKind::LoopPoint {
            saw_loop = true;
        }
    }
    assert!(saw_loop);
}

#[test]
fn two_voices_mix_additively() {
    let engine = headless_engine();
    let a = engine
        .load(dc_wav_f32(128, 0.25), CompressionMode::CompressInMemory)
        .unwrap();
    let b = engine
        .load(dc_wav_f32(128, 0.5), CompressionMode::CompressInMemory)
        .unwrap();
    engine.play(a).unwrap();
    engine.play(b).unwrap();

    let mut output = vec![0.0f32; 256];
    engine.render(&mut output, 2);

    assert!((output[0] - 0.75).abs() < 1e-3);
}

#[test]
fn clock_advances_with_renders() {
    let engine = headless_engine();
    let clock = engine.clock();

    let mut output = vec![0.0f32; 256];
    for _ in 0..10 {
        engine.render(&mut output, 2);
    }

    assert_eq!(clock.frames(), 1280);
    let time = clock.time_seconds();
    let base = 1280.0 / 44100.0;
    assert!(time >= base);
    assert!(time < base + 0.1, "interpolation ran away: {time}");
}

#[test]
fn seek_command_applies_before_decode() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 0.5), CompressionMode::CompressInMemory)
        .unwrap();

    engine.play(handle).unwrap();
    engine.seek(handle, 64).unwrap();

    let mut output = vec![0.0f32; 128];
    engine.render(&mut output, 2); // frames 64..128
    assert!((output[0] - 0.5).abs() < 1e-3);

    engine.render(&mut output, 2); // EOS
    assert_eq!(engine.poll_event().unwrap().kind, EventKind::VoiceFinished);
}

#[test]
fn seek_past_end_then_decode_finishes() {
    let engine = headless_engine();
    let handle = engine
        .load(dc_wav_f32(128, 0.5), CompressionMode::CompressInMemory)
        .unwrap();

    engine.play(handle).unwrap();
    engine.seek(handle, 10_000).unwrap();

    let mut output = vec![0.0f32; 128];
    engine.render(&mut output, 2);

    assert!(output.iter().all(|&v| v == 0.0));
    assert_eq!(engine.poll_event().unwrap().kind, EventKind::VoiceFinished);
}

#[test]
fn decompress_on_load_plays_identically() {
    let engine = headless_engine();

    let streamed = engine
        .load(dc_wav_f32(128, 0.6), CompressionMode::CompressInMemory)
        .unwrap();
    let preloaded = engine
        .load(dc_wav_f32(128, 0.6), CompressionMode::DecompressOnLoad)
        .unwrap();

    engine.play(streamed).unwrap();
    let mut streamed_output = vec![0.0f32; 256];
    engine.render(&mut streamed_output, 2);
    engine.stop(streamed).unwrap();
    engine.render(&mut vec![0.0f32; 256], 2); // drain the stop

    engine.play(preloaded).unwrap();
    let mut preloaded_output = vec![0.0f32; 256];
    engine.render(&mut preloaded_output, 2);

    assert_eq!(streamed_output, preloaded_output);

    // Decoded bytes are charged to the decoded pool, not the compressed one
    let usage = engine.memory_usage();
    assert_eq!(usage.decoded_bytes, 128 * 2 * 4);
}
