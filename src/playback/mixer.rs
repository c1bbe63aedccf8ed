//! Mix bus: the audio callback
//!
//! One `process` call services one output buffer. The pass is strictly
//! ordered: drain commands, then decode and accumulate every playing voice,
//! then master gain, peak metering, finished-voice reporting, and the clock
//! advance. Within a callback, a command enqueued before the drain is always
//! visible to every voice decode, and the published peak always belongs to
//! the buffer just produced.
//!
//! The callback performs no allocation, takes no lock, and never logs.
//! Scratch memory comes from the frame arena; if the arena is exhausted the
//! pre-allocated heap fallback takes over for the rest of the callback.

use crate::audio::arena::FrameArena;
use crate::audio::clock::AudioClock;
use crate::audio::simd;
use crate::audio::types::PlaybackState;
use crate::decoder::AudioDecoder;
use crate::playback::commands::{CommandConsumer, CommandKind};
use crate::playback::events::{Event, EventProducer};
use crate::playback::registry::{SnapshotShared, MAX_VOICES};
use crate::playback::voice::Voice;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Upper bound on frames per callback the engine supports. Sizes the heap
/// fallback so it never grows on the audio thread.
pub const MAX_BLOCK_FRAMES: usize = 8192;

/// Counters mirrored out of the callback for control-side diagnostics.
#[derive(Debug, Default)]
pub struct MixerStats {
    /// Arena bytes used by the most recent callback
    pub arena_used: AtomicUsize,

    /// Arena OOM events in the most recent callback
    pub arena_oom: AtomicUsize,

    /// Total callbacks processed
    pub callbacks: AtomicU64,
}

/// The audio thread's mixer state.
///
/// Owned by whichever thread drives the callback; everything shared with the
/// control thread goes through atomics or the SPSC queues.
pub struct MixBus {
    arena: FrameArena,

    /// Heap scratch used when the arena cannot serve the callback. Sized
    /// once at construction; never grown on the audio thread.
    fallback: Vec<f32>,

    commands: CommandConsumer,
    events: EventProducer,
    snapshot: Arc<SnapshotShared>,
    clock: Arc<AudioClock>,

    /// Master gain as f32 bits, shared with the facade
    master_volume_bits: Arc<AtomicU32>,

    /// Peak level of the last buffer as f32 bits, shared with the facade
    peak_bits: Arc<AtomicU32>,

    stats: Arc<MixerStats>,

    /// Snapshot indices of voices that hit EOS this callback
    finished: [usize; MAX_VOICES],
}

impl MixBus {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        arena: FrameArena,
        commands: CommandConsumer,
        events: EventProducer,
        snapshot: Arc<SnapshotShared>,
        clock: Arc<AudioClock>,
        master_volume_bits: Arc<AtomicU32>,
        peak_bits: Arc<AtomicU32>,
        stats: Arc<MixerStats>,
    ) -> Self {
        Self {
            arena,
            fallback: vec![0.0; MAX_BLOCK_FRAMES * 2],
            commands,
            events,
            snapshot,
            clock,
            master_volume_bits,
            peak_bits,
            stats,
            finished: [0; MAX_VOICES],
        }
    }

    /// Service one output buffer of interleaved float samples.
    pub fn process(&mut self, output: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = output.len() / channels;

        // 1. Reclaim all of last callback's scratch at once.
        self.arena.reset();

        // 2. Snapshot first (records the observed flip), then apply every
        //    pending command so a seek issued this tick affects this tick's
        //    decode.
        let snapshot = Arc::clone(&self.snapshot);
        // SAFETY: single driver thread; the slice stays valid for this
        // callback per the publication protocol.
        let voices = unsafe { snapshot.acquire() };

        while let Some(cmd) = self.commands.try_pop() {
            Self::apply_command(voices, &cmd, self.clock.sample_rate());
        }

        // 3. Clear the bus and grab voice scratch. Mono sources upmix in
        //    place, so scratch is sized for at least two channels.
        simd::clear(output);
        let mut finished_count = 0usize;
        let mut short_fill = false;

        let scratch_channels = channels.max(2);
        let scratch: &mut [f32] = match self.arena.alloc_floats(frames * scratch_channels) {
            Some(scratch) => scratch,
            None => &mut self.fallback[..],
        };

        // The fallback can be smaller than an oversized driver buffer; the
        // unmixable tail stays silent and is reported as an underrun.
        let mix_frames = frames.min(scratch.len() / scratch_channels);
        if mix_frames < frames {
            short_fill = true;
        }

        // 4. Decode, pan, and accumulate every playing voice.
        for (index, voice) in voices.iter().enumerate() {
            if voice.state() != PlaybackState::Playing {
                continue;
            }

            voice.apply_fade(mix_frames as u64);

            // SAFETY: decoder is audio-thread-owned; this is the only
            // borrow in flight.
            let decoder = unsafe { voice.decoder_mut() };
            let src_channels = decoder.format().channels as usize;
            // Mono upmixes below; a source wider than the bus is skipped.
            if src_channels == 0 || src_channels > 2 || src_channels > channels {
                continue;
            }

            simd::clear(&mut scratch[..mix_frames * scratch_channels]);
            let mut produced = decoder.decode(scratch, mix_frames);

            if produced < mix_frames && voice.looping() {
                // Wrap once and keep filling from the loop point.
                decoder.seek(0);
                let more = decoder.decode(
                    &mut scratch[produced * src_channels..mix_frames * src_channels],
                    mix_frames - produced,
                );
                if more > 0 {
                    let _ = self
                        .events
                        .try_push(Event::loop_point(voice.handle, voice.generation));
                }
                produced += more;
            }

            if produced == 0 {
                if finished_count < MAX_VOICES {
                    self.finished[finished_count] = index;
                    finished_count += 1;
                }
                continue;
            }

            if src_channels == 1 && channels >= 2 {
                // Upmix in place; iterate backwards so unread mono samples
                // are not overwritten.
                for i in (0..produced).rev() {
                    let sample = scratch[i];
                    scratch[2 * i] = sample;
                    scratch[2 * i + 1] = sample;
                }
            }

            if channels == 2 {
                let pan = voice.pan();
                if pan != 0.0 {
                    simd::apply_stereo_pan(&mut scratch[..produced * 2], pan);
                }
            }

            simd::mix_add(
                &mut output[..produced * channels],
                &scratch[..produced * channels],
                voice.volume(),
            );
        }

        // 5. Master gain.
        let master = f32::from_bits(self.master_volume_bits.load(Ordering::Relaxed));
        if master != 1.0 {
            simd::apply_gain(output, master);
        }

        // 6. Peak metering for this buffer.
        let peak = simd::peak_level(output);
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);

        // 7. Report voices that ended this callback. A full event queue
        //    drops the notification; the state transition still happens.
        for &index in &self.finished[..finished_count] {
            let voice = &voices[index];
            voice.set_state(PlaybackState::Stopped);
            let _ = self
                .events
                .try_push(Event::voice_finished(voice.handle, voice.generation));
        }
        if short_fill {
            let _ = self.events.try_push(Event {
                kind: crate::playback::events::EventKind::BufferUnderrun,
                voice: -1,
                generation: 0,
                param: (frames - mix_frames) as i32,
            });
        }

        // 8. Advance the DSP timeline by the full buffer.
        self.clock.advance(frames);

        self.stats
            .arena_used
            .store(self.arena.used(), Ordering::Relaxed);
        self.stats
            .arena_oom
            .store(self.arena.oom_count(), Ordering::Relaxed);
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Apply one drained command to the addressed voice(s).
    fn apply_command(voices: &[Arc<Voice>], cmd: &crate::playback::commands::Command, sample_rate: u32) {
        if cmd.kind == CommandKind::StopAll {
            for voice in voices {
                Self::stop_voice(voice);
            }
            return;
        }

        let Some(voice) = voices.iter().find(|v| v.handle == cmd.voice) else {
            return; // stale handle; the load was already unloaded
        };

        match cmd.kind {
            CommandKind::Play => {
                if voice.state() == PlaybackState::Stopped {
                    // SAFETY: audio-thread-owned decoder
                    unsafe { voice.decoder_mut().seek(0) };
                }
                voice.set_state(PlaybackState::Playing);
            }
            CommandKind::Stop => Self::stop_voice(voice),
            CommandKind::Pause => {
                if voice.state() == PlaybackState::Playing {
                    voice.set_state(PlaybackState::Paused);
                }
            }
            CommandKind::Resume => {
                if voice.state() == PlaybackState::Paused {
                    voice.set_state(PlaybackState::Playing);
                }
            }
            CommandKind::SetVolume => voice.set_volume(cmd.p0),
            CommandKind::SetPan => voice.set_pan(cmd.p0),
            CommandKind::SetLoop => voice.set_looping(cmd.p0 != 0.0),
            CommandKind::FadeVolume => {
                let frames = (cmd.duration.max(0.0) as f64 * sample_rate as f64) as u64;
                voice.begin_fade(cmd.p1, frames);
            }
            CommandKind::Seek => {
                let target = cmd.seek_frame.clamp(0, voice.clip.total_frames.max(0));
                // SAFETY: audio-thread-owned decoder
                unsafe { voice.decoder_mut().seek(target) };
            }
            // Pitch requires resampling, which this engine does not do;
            // the command is accepted and drained without effect.
            CommandKind::SetPitch => {}
            CommandKind::Noop | CommandKind::StopAll => {}
        }
    }

    fn stop_voice(voice: &Arc<Voice>) {
        voice.set_state(PlaybackState::Stopped);
        // SAFETY: audio-thread-owned decoder
        unsafe { voice.decoder_mut().seek(0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::{ClipInfo, CompressionMode, SourceBytes};
    use crate::decoder::Decoder;
    use crate::playback::commands::{command_queue, Command, CommandProducer};
    use crate::playback::events::{event_queue, EventConsumer, EventKind};
    use crate::playback::registry::SourceRegistry;
    use std::io::Cursor;

    /// Stereo 32-bit-float WAV holding a DC signal.
    fn make_dc_wav(frames: usize, amplitude: f32) -> Vec<u8> {
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

    struct Harness {
        bus: MixBus,
        registry: SourceRegistry,
        commands: CommandProducer,
        events: EventConsumer,
        stats: Arc<MixerStats>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_arena(128 * 1024)
        }

        fn with_arena(arena_bytes: usize) -> Self {
            let (cmd_tx, cmd_rx) = command_queue();
            let (evt_tx, evt_rx) = event_queue();
            let snapshot = SnapshotShared::new();
            let clock = Arc::new(AudioClock::new(44100, 128));
            let master = Arc::new(AtomicU32::new(1.0f32.to_bits()));
            let peak = Arc::new(AtomicU32::new(0.0f32.to_bits()));
            let stats = Arc::new(MixerStats::default());

            let bus = MixBus::new(
                FrameArena::new(arena_bytes),
                cmd_rx,
                evt_tx,
                Arc::clone(&snapshot),
                Arc::clone(&clock),
                master,
                peak,
                Arc::clone(&stats),
            );

            Self {
                bus,
                registry: SourceRegistry::new(snapshot),
                commands: cmd_tx,
                events: evt_rx,
                stats,
            }
        }

        fn load_dc(&mut self, frames: usize, amplitude: f32) -> i32 {
            let bytes = Arc::new(SourceBytes::new(make_dc_wav(frames, amplitude)));
            let decoder = Decoder::open(&bytes).unwrap();
            let clip = ClipInfo::from_format(
                crate::decoder::AudioDecoder::format(&decoder),
                crate::decoder::AudioDecoder::total_frames(&decoder),
                CompressionMode::CompressInMemory,
            );
            let (handle, generation) = self.registry.allocate_slot().unwrap();
            self.registry.insert(Arc::new(Voice::new(
                handle,
                generation,
                clip,
                Some(bytes),
                decoder,
            )));
            handle
        }

        fn play(&mut self, handle: i32) {
            assert!(self.commands.try_push(Command::play(handle)));
        }

        fn master(&mut self, volume: f32) {
            self.bus
                .master_volume_bits
                .store(volume.to_bits(), Ordering::Relaxed);
        }
    }

    #[test]
    fn test_silence_when_no_voices() {
        let mut h = Harness::new();

        let mut output = vec![99.0f32; 256];
        h.bus.process(&mut output, 2);

        assert!(output.iter().all(|&v| v == 0.0));
        let peak = f32::from_bits(h.bus.peak_bits.load(Ordering::Relaxed));
        assert_eq!(peak, 0.0);
    }

    #[test]
    fn test_master_volume_scales_output() {
        let mut h = Harness::new();
        let handle = h.load_dc(128, 0.8);
        h.master(0.5);
        h.play(handle);

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        // 0.8 * 1.0 * 0.5 = 0.4
        assert!((output[0] - 0.4).abs() < 1e-3);
        assert!((output[1] - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_source_volume_scales_output() {
        let mut h = Harness::new();
        let handle = h.load_dc(128, 1.0);
        h.play(handle);
        assert!(h.commands.try_push(Command::set_volume(handle, 0.25)));

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        assert!((output[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_peak_level_tracks_buffer() {
        let mut h = Harness::new();
        let handle = h.load_dc(128, 0.75);
        h.play(handle);

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        let peak = f32::from_bits(h.bus.peak_bits.load(Ordering::Relaxed));
        assert!((peak - 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_finished_voice_reported_once() {
        let mut h = Harness::new();
        let handle = h.load_dc(64, 0.5);
        h.play(handle);

        let mut output = vec![0.0f32; 128];

        // First call consumes the whole clip; not yet finished
        h.bus.process(&mut output, 2);
        assert!(h.events.try_pop().is_none());

        // Second call hits EOS and reports exactly one finished voice
        h.bus.process(&mut output, 2);
        let event = h.events.try_pop().unwrap();
        assert_eq!(event.kind, EventKind::VoiceFinished);
        assert_eq!(event.voice, handle);
        assert!(h.events.try_pop().is_none());

        let voice = h.registry.get(handle).unwrap();
        assert_eq!(voice.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_arena_feeds_scratch_and_matches_fallback_path() {
        let mut h = Harness::with_arena(64 * 1024);
        let handle = h.load_dc(128, 0.5);
        h.play(handle);

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        assert!(h.stats.arena_used.load(Ordering::Relaxed) > 0);
        assert_eq!(h.stats.arena_oom.load(Ordering::Relaxed), 0);
        assert!((output[0] - 0.5).abs() < 1e-3);

        // Tiny arena forces the heap fallback; the audio is identical
        let mut h2 = Harness::with_arena(32);
        let handle2 = h2.load_dc(128, 0.5);
        h2.play(handle2);
        assert!(h2.commands.try_push(Command::seek(handle2, 0)));

        let mut fallback_output = vec![0.0f32; 256];
        h2.bus.process(&mut fallback_output, 2);

        assert!(h2.stats.arena_oom.load(Ordering::Relaxed) > 0);
        assert_eq!(output, fallback_output);
    }

    #[test]
    fn test_pan_hard_left_silences_right() {
        let mut h = Harness::new();
        let handle = h.load_dc(128, 0.5);
        h.play(handle);
        assert!(h.commands.try_push(Command::set_pan(handle, -1.0)));

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        assert!((output[0] - 0.5).abs() < 1e-3); // left
        assert!(output[1].abs() < 1e-4); // right
    }

    #[test]
    fn test_two_voices_accumulate() {
        let mut h = Harness::new();
        let a = h.load_dc(128, 0.25);
        let b = h.load_dc(128, 0.5);
        h.play(a);
        h.play(b);

        let mut output = vec![0.0f32; 256];
        h.bus.process(&mut output, 2);

        assert!((output[0] - 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_loop_wraps_within_callback() {
        let mut h = Harness::new();
        // 48-frame clip into a 64-frame callback: wraps once mid-buffer
        let handle = h.load_dc(48, 0.5);
        h.play(handle);
        assert!(h.commands.try_push(Command::set_loop(handle, true)));

        let mut output = vec![0.0f32; 128];
        h.bus.process(&mut output, 2);

        // The wrap refills the tail; no silent gap
        assert!((output[127] - 0.5).abs() < 1e-3);

        let event = h.events.try_pop().unwrap();
        assert_eq!(event.kind, EventKind::LoopPoint);

        // And the voice keeps playing
        let voice = h.registry.get(handle).unwrap();
        assert_eq!(voice.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_pause_resume_preserves_position() {
        let mut h = Harness::new();
        let handle = h.load_dc(256, 0.5);
        h.play(handle);

        let mut output = vec![0.0f32; 128];
        h.bus.process(&mut output, 2); // consume 64 frames

        assert!(h.commands.try_push(Command::pause(handle)));
        h.bus.process(&mut output, 2);
        assert!(output.iter().all(|&v| v == 0.0), "paused voice must be silent");

        assert!(h.commands.try_push(Command::resume(handle)));
        h.bus.process(&mut output, 2);
        assert!((output[0] - 0.5).abs() < 1e-3);

        // 64 + 64 frames consumed of 256: two more callbacks to EOS
        h.bus.process(&mut output, 2);
        h.bus.process(&mut output, 2);
        h.bus.process(&mut output, 2);
        let finished = (0..8).find_map(|_| h.events.try_pop());
        assert_eq!(finished.unwrap().kind, EventKind::VoiceFinished);
    }

    #[test]
    fn test_stop_rewinds_to_start() {
        let mut h = Harness::new();
        let handle = h.load_dc(256, 0.5);
        h.play(handle);

        let mut output = vec![0.0f32; 128];
        h.bus.process(&mut output, 2);

        assert!(h.commands.try_push(Command::stop(handle)));
        h.bus.process(&mut output, 2);
        assert_eq!(
            h.registry.get(handle).unwrap().state(),
            PlaybackState::Stopped
        );

        // Replaying produces the full clip again: 4 x 64 frames before EOS
        h.play(handle);
        for _ in 0..4 {
            h.bus.process(&mut output, 2);
            assert!((output[0] - 0.5).abs() < 1e-3);
            assert!(h.events.try_pop().is_none());
        }
        h.bus.process(&mut output, 2);
        assert_eq!(h.events.try_pop().unwrap().kind, EventKind::VoiceFinished);
    }

    #[test]
    fn test_stop_all() {
        let mut h = Harness::new();
        let a = h.load_dc(128, 0.5);
        let b = h.load_dc(128, 0.5);
        h.play(a);
        h.play(b);

        let mut output = vec![0.0f32; 64];
        h.bus.process(&mut output, 2);

        assert!(h.commands.try_push(Command::stop_all()));
        h.bus.process(&mut output, 2);

        assert!(output.iter().all(|&v| v == 0.0));
        assert_eq!(h.registry.get(a).unwrap().state(), PlaybackState::Stopped);
        assert_eq!(h.registry.get(b).unwrap().state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_clock_advances_per_callback() {
        let mut h = Harness::new();
        let mut output = vec![0.0f32; 256];

        h.bus.process(&mut output, 2);
        h.bus.process(&mut output, 2);

        assert_eq!(h.bus.clock.frames(), 256);
        assert_eq!(h.stats.callbacks.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_seek_applies_before_decode() {
        let mut h = Harness::new();
        // 128-frame clip; seek to 64 then play one 64-frame callback: EOS
        // arrives on the very next callback.
        let handle = h.load_dc(128, 0.5);
        h.play(handle);
        assert!(h.commands.try_push(Command::seek(handle, 64)));

        let mut output = vec![0.0f32; 128];
        h.bus.process(&mut output, 2);
        assert!((output[0] - 0.5).abs() < 1e-3);

        h.bus.process(&mut output, 2);
        assert_eq!(h.events.try_pop().unwrap().kind, EventKind::VoiceFinished);
    }
}
