//! Engine facade
//!
//! The control surface of the engine: lifecycle, source management,
//! playback control, engine-wide settings, and event polling. Control
//! callers are serialized by one mutex; nothing the audio thread touches is
//! ever behind that mutex.
//!
//! Mutation rules, by field:
//! - Voice `volume` / `pan` / `loop` are written here directly (relaxed
//!   atomic stores; audible within one callback).
//! - Voice `state` and the decoder are owned by the audio thread, so play,
//!   pause, stop, resume, seek, and fades are routed through the command
//!   queue and applied at the next callback boundary.

use crate::audio::arena::FrameArena;
use crate::audio::clock::AudioClock;
use crate::audio::types::{
    ClipInfo, CompressionMode, PlaybackState, SourceBytes, SourceHandle,
};
use crate::budget::{MemoryBudget, MemoryUsage};
use crate::config::EngineConfig;
use crate::decoder::{AudioDecoder, Decoder, PreloadedDecoder};
use crate::error::{Error, Result};
use crate::output::AudioOutput;
use crate::playback::commands::{command_queue, Command, CommandBatch, CommandProducer};
use crate::playback::events::{Event, EventConsumer};
use crate::playback::mixer::{MixBus, MixerStats, MAX_BLOCK_FRAMES};
use crate::playback::registry::{SnapshotShared, SourceRegistry, MAX_VOICES};
use crate::playback::voice::{AudioCell, Voice};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const DEVICE_EVENT_NONE: u8 = 0;
const DEVICE_EVENT_LOST: u8 = 1;
const DEVICE_EVENT_RESTORED: u8 = 2;

/// State visible to the audio thread, outside the control mutex.
pub struct EngineShared {
    /// The mixer, installed at initialize and removed at shutdown — both
    /// while no driver is delivering callbacks.
    mix: AudioCell<Option<MixBus>>,

    pub(crate) snapshot: Arc<SnapshotShared>,
    pub(crate) clock: Arc<AudioClock>,
    master_volume_bits: Arc<AtomicU32>,
    peak_bits: Arc<AtomicU32>,
    stats: Arc<MixerStats>,
    initialized: AtomicBool,

    /// Device loss/restore reported by the output driver's error path,
    /// surfaced through `poll_event`
    pending_device_event: AtomicU8,

    /// Set on device loss; cleared when an output stream comes back up
    device_lost: AtomicBool,
}

impl EngineShared {
    /// The mixer callback: fill one buffer of interleaved float samples.
    ///
    /// This is the entry point a platform output driver calls on its audio
    /// thread, and the one headless hosts call to render offline. Exactly
    /// one thread may drive it at a time.
    pub fn render(&self, output: &mut [f32], channels: usize) {
        if !self.initialized.load(Ordering::Acquire) {
            output.fill(0.0);
            return;
        }

        // SAFETY: the mixer is installed/removed only while no driver is
        // running, and `render` has a single caller by contract.
        let bus = unsafe { &mut *self.mix.get() };
        match bus.as_mut() {
            Some(bus) => bus.process(output, channels),
            None => output.fill(0.0),
        }
    }

    /// Record device loss; delivered as a `DeviceLost` event on the next
    /// poll. Called from the driver's error callback.
    pub(crate) fn notify_device_lost(&self) {
        self.device_lost.store(true, Ordering::Release);
        self.pending_device_event
            .store(DEVICE_EVENT_LOST, Ordering::Release);
    }

    /// Called when an output stream comes up; reports `DeviceRestored` if a
    /// loss was recorded earlier.
    fn notify_output_started(&self) {
        if self.device_lost.swap(false, Ordering::AcqRel) {
            self.pending_device_event
                .store(DEVICE_EVENT_RESTORED, Ordering::Release);
        }
    }
}

/// Control-side state, serialized by the engine mutex.
struct EngineInner {
    config: EngineConfig,
    registry: SourceRegistry,
    commands: Option<CommandProducer>,
    events: Option<EventConsumer>,
    output: Option<AudioOutput>,
    budget: MemoryBudget,
    initialized: bool,
}

/// The audio engine.
///
/// One value owned by the host. `&self` methods are safe to call from any
/// control thread; the audio thread only ever touches [`EngineShared`].
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    inner: Mutex<EngineInner>,
}

impl AudioEngine {
    /// Create an engine with the given configuration. No resources are
    /// acquired until [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig) -> Self {
        let snapshot = SnapshotShared::new();
        let clock = Arc::new(AudioClock::new(
            config.output.sample_rate,
            config.output.buffer_size,
        ));

        let shared = Arc::new(EngineShared {
            mix: AudioCell::new(None),
            snapshot: Arc::clone(&snapshot),
            clock,
            master_volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            peak_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
            stats: Arc::new(MixerStats::default()),
            initialized: AtomicBool::new(false),
            pending_device_event: AtomicU8::new(DEVICE_EVENT_NONE),
            device_lost: AtomicBool::new(false),
        });

        let inner = EngineInner {
            registry: SourceRegistry::new(snapshot),
            commands: None,
            events: None,
            output: None,
            budget: MemoryBudget::new(config.budget),
            config,
            initialized: false,
        };

        Self {
            shared,
            inner: Mutex::new(inner),
        }
    }

    /// Bring the engine up: queues, arena, mixer, and (unless headless) the
    /// platform output stream.
    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.initialized {
            return Err(Error::AlreadyInitialized);
        }

        let out = inner.config.output;
        if out.sample_rate == 0 || out.channels == 0 {
            return Err(Error::InvalidParam("invalid output format".into()));
        }
        if out.buffer_size == 0 || out.buffer_size as usize > MAX_BLOCK_FRAMES {
            return Err(Error::InvalidParam(format!(
                "buffer size {} out of range (1..={MAX_BLOCK_FRAMES})",
                out.buffer_size
            )));
        }

        let (cmd_tx, cmd_rx) = command_queue();
        let (evt_tx, evt_rx) = crate::playback::events::event_queue();

        self.shared.clock.set_sample_rate(out.sample_rate);
        self.shared.clock.set_buffer_size(out.buffer_size);
        self.shared.clock.reset();

        let bus = MixBus::new(
            FrameArena::new(inner.config.arena_capacity),
            cmd_rx,
            evt_tx,
            Arc::clone(&self.shared.snapshot),
            Arc::clone(&self.shared.clock),
            Arc::clone(&self.shared.master_volume_bits),
            Arc::clone(&self.shared.peak_bits),
            Arc::clone(&self.shared.stats),
        );

        // SAFETY: no driver is running yet; this thread has exclusive
        // access to the mixer cell.
        unsafe { *self.shared.mix.get() = Some(bus) };
        self.shared.initialized.store(true, Ordering::Release);

        if inner.config.enable_output {
            let device = inner.config.device.clone();
            match AudioOutput::start(device.as_deref(), &out, Arc::clone(&self.shared)) {
                Ok(output) => {
                    // The device may have negotiated a different rate; the
                    // clock follows what the callback actually runs at.
                    self.shared.clock.set_sample_rate(output.sample_rate());
                    self.shared.snapshot.set_audio_live(true);
                    self.shared.notify_output_started();
                    inner.output = Some(output);
                }
                Err(e) => {
                    self.shared.initialized.store(false, Ordering::Release);
                    // SAFETY: stream creation failed, so no driver exists.
                    unsafe { *self.shared.mix.get() = None };
                    return Err(e);
                }
            }
        }

        inner.commands = Some(cmd_tx);
        inner.events = Some(evt_rx);
        inner.initialized = true;

        info!(
            sample_rate = out.sample_rate,
            channels = out.channels,
            buffer_size = out.buffer_size,
            headless = !inner.config.enable_output,
            "engine initialized"
        );
        Ok(())
    }

    /// Tear the engine down: stop the output stream first, then drop the
    /// mixer and every loaded source. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if !inner.initialized {
            return;
        }

        if let Some(mut output) = inner.output.take() {
            output.stop();
        }
        self.shared.snapshot.set_audio_live(false);
        self.shared.initialized.store(false, Ordering::Release);

        let held: Vec<(usize, usize)> = inner
            .registry
            .voices()
            .map(|v| (v.budget_compressed, v.budget_decoded))
            .collect();
        for (compressed, decoded) in held {
            inner.budget.free_compressed(compressed);
            inner.budget.free_decoded(decoded);
        }
        inner.registry.clear();

        // SAFETY: the stream is stopped, so no callback can be in flight.
        unsafe { *self.shared.mix.get() = None };
        self.shared.clock.reset();

        inner.commands = None;
        inner.events = None;
        inner.initialized = false;
        info!("engine shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    // ── Source management ────────────────────────────────────────────

    /// Load audio from memory. Returns the voice handle.
    pub fn load(&self, bytes: Vec<u8>, mode: CompressionMode) -> Result<SourceHandle> {
        let mut inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }
        if bytes.is_empty() {
            return Err(Error::InvalidParam("empty audio data".into()));
        }

        let compressed_size = bytes.len();
        if !inner.budget.try_alloc_compressed(compressed_size) {
            let usage = inner.budget.usage();
            return Err(Error::OutOfMemory {
                requested: compressed_size,
                available: inner
                    .budget
                    .config()
                    .max_compressed_bytes
                    .saturating_sub(usage.compressed_bytes),
            });
        }

        let data = Arc::new(SourceBytes::new(bytes));
        let mut decoder = match Decoder::open(&data) {
            Ok(decoder) => decoder,
            Err(e) => {
                inner.budget.free_compressed(compressed_size);
                return Err(e);
            }
        };

        let source_format = decoder.format();
        let mut budget_compressed = compressed_size;
        let mut budget_decoded = 0;
        let mut keep_data = Some(Arc::clone(&data));

        if mode == CompressionMode::DecompressOnLoad {
            let samples = decoder.decode_all();
            let decoded_size = samples.len() * std::mem::size_of::<f32>();
            if !inner.budget.try_alloc_decoded(decoded_size) {
                inner.budget.free_compressed(compressed_size);
                let usage = inner.budget.usage();
                return Err(Error::OutOfMemory {
                    requested: decoded_size,
                    available: inner
                        .budget
                        .config()
                        .max_decoded_bytes
                        .saturating_sub(usage.decoded_bytes),
                });
            }

            decoder = Decoder::Preloaded(PreloadedDecoder::new(samples, source_format));
            // The compressed form is no longer needed once pre-decoded.
            inner.budget.free_compressed(compressed_size);
            budget_compressed = 0;
            budget_decoded = decoded_size;
            keep_data = None;
        }

        let clip = ClipInfo::from_format(source_format, decoder.total_frames(), mode);

        let Some((handle, generation)) = inner.registry.allocate_slot() else {
            inner.budget.free_compressed(budget_compressed);
            inner.budget.free_decoded(budget_decoded);
            return Err(Error::InvalidParam(format!(
                "voice limit ({MAX_VOICES}) reached"
            )));
        };

        let mut voice = Voice::new(handle, generation, clip, keep_data, decoder);
        voice.budget_compressed = budget_compressed;
        voice.budget_decoded = budget_decoded;
        inner.registry.insert(Arc::new(voice));

        info!(
            handle,
            bytes = compressed_size,
            frames = clip.total_frames,
            mode = ?mode,
            "loaded audio clip"
        );
        Ok(handle)
    }

    /// Unload a source. The audio thread observes the updated snapshot at
    /// its next callback; the voice's memory is released once no snapshot
    /// references it.
    pub fn unload(&self, handle: SourceHandle) -> Result<()> {
        let mut inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }

        let voice = inner
            .registry
            .remove(handle)
            .ok_or_else(|| Error::InvalidParam(format!("invalid handle {handle}")))?;

        inner.budget.free_compressed(voice.budget_compressed);
        inner.budget.free_decoded(voice.budget_decoded);
        debug!(handle, "unloaded audio clip");
        Ok(())
    }

    // ── Playback control (routed through the command queue) ──────────

    pub fn play(&self, handle: SourceHandle) -> Result<()> {
        self.send_for(handle, Command::play(handle))
    }

    pub fn pause(&self, handle: SourceHandle) -> Result<()> {
        self.send_for(handle, Command::pause(handle))
    }

    pub fn resume(&self, handle: SourceHandle) -> Result<()> {
        self.send_for(handle, Command::resume(handle))
    }

    pub fn stop(&self, handle: SourceHandle) -> Result<()> {
        self.send_for(handle, Command::stop(handle))
    }

    /// Stop every voice at the next callback.
    pub fn stop_all(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }
        Self::send(&mut inner, Command::stop_all());
        Ok(())
    }

    /// Seek to an absolute frame. Applied on the audio thread before the
    /// next decode; the target clamps to the clip length.
    pub fn seek(&self, handle: SourceHandle, frame: i64) -> Result<()> {
        self.send_for(handle, Command::seek(handle, frame.max(0)))
    }

    /// Ramp the voice volume to `target` over `duration_seconds`.
    pub fn fade_volume(
        &self,
        handle: SourceHandle,
        target: f32,
        duration_seconds: f32,
    ) -> Result<()> {
        self.send_for(handle, Command::fade_volume(handle, target, duration_seconds))
    }

    // ── Voice properties (direct atomic writes) ──────────────────────

    pub fn set_volume(&self, handle: SourceHandle, volume: f32) -> Result<()> {
        self.with_voice(handle, |voice| voice.set_volume(volume))
    }

    pub fn get_volume(&self, handle: SourceHandle) -> Result<f32> {
        self.with_voice(handle, |voice| voice.volume())
    }

    /// Set stereo pan; values outside [-1, +1] are clamped.
    pub fn set_pan(&self, handle: SourceHandle, pan: f32) -> Result<()> {
        self.with_voice(handle, |voice| voice.set_pan(pan))
    }

    pub fn get_pan(&self, handle: SourceHandle) -> Result<f32> {
        self.with_voice(handle, |voice| voice.pan())
    }

    pub fn set_loop(&self, handle: SourceHandle, looping: bool) -> Result<()> {
        self.with_voice(handle, |voice| voice.set_looping(looping))
    }

    pub fn get_state(&self, handle: SourceHandle) -> Result<PlaybackState> {
        self.with_voice(handle, |voice| voice.state())
    }

    pub fn get_clip_info(&self, handle: SourceHandle) -> Result<ClipInfo> {
        self.with_voice(handle, |voice| voice.clip)
    }

    // ── Engine-wide controls ─────────────────────────────────────────

    /// Master gain applied after the mix; floor-clamped at 0.
    pub fn set_master_volume(&self, volume: f32) {
        self.shared
            .master_volume_bits
            .store(volume.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.shared.master_volume_bits.load(Ordering::Relaxed))
    }

    /// Peak level of the most recent callback's output.
    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.shared.peak_bits.load(Ordering::Relaxed))
    }

    /// Update the preferred buffer size. The clock's interpolation clamp
    /// follows immediately; the output stream picks it up on the next
    /// initialize.
    pub fn set_buffer_size(&self, frames: u32) -> Result<()> {
        if frames == 0 || frames as usize > MAX_BLOCK_FRAMES {
            return Err(Error::InvalidParam(format!(
                "buffer size {frames} out of range (1..={MAX_BLOCK_FRAMES})"
            )));
        }
        let mut inner = self.lock();
        inner.config.output.buffer_size = frames;
        self.shared.clock.set_buffer_size(frames);
        Ok(())
    }

    /// Nominal output latency in milliseconds.
    pub fn current_latency_ms(&self) -> f32 {
        let inner = self.lock();
        let out = inner.config.output;
        if out.sample_rate > 0 {
            out.buffer_size as f32 / out.sample_rate as f32 * 1000.0
        } else {
            0.0
        }
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.lock().budget.usage()
    }

    /// Whether memory usage has crossed the configured warning threshold.
    pub fn memory_warning(&self) -> bool {
        self.lock().budget.is_warning()
    }

    /// The DSP clock, readable from any thread.
    pub fn clock(&self) -> Arc<AudioClock> {
        Arc::clone(&self.shared.clock)
    }

    /// Mixer diagnostics (arena usage, callback count).
    pub fn mixer_stats(&self) -> Arc<MixerStats> {
        Arc::clone(&self.shared.stats)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Drain one event from the audio thread, if any.
    pub fn poll_event(&self) -> Option<Event> {
        let mut inner = self.lock();

        match self
            .shared
            .pending_device_event
            .swap(DEVICE_EVENT_NONE, Ordering::AcqRel)
        {
            DEVICE_EVENT_LOST => return Some(Event::device_lost()),
            DEVICE_EVENT_RESTORED => return Some(Event::device_restored()),
            _ => {}
        }

        inner.events.as_mut().and_then(|events| events.try_pop())
    }

    /// Submit a prepared command batch in one pass. Returns how many
    /// commands the queue accepted.
    pub fn submit_batch(&self, batch: &mut CommandBatch) -> Result<usize> {
        let mut inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }
        let Some(commands) = inner.commands.as_mut() else {
            return Err(Error::NotInitialized);
        };
        Ok(batch.submit(commands))
    }

    // ── Driver entry ─────────────────────────────────────────────────

    /// Render one buffer. This is the mixer callback the output driver
    /// invokes; headless hosts call it directly.
    pub fn render(&self, output: &mut [f32], channels: usize) {
        self.shared.render(output, channels);
    }

    /// Shared state handed to output drivers.
    pub fn shared(&self) -> Arc<EngineShared> {
        Arc::clone(&self.shared)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send(inner: &mut EngineInner, cmd: Command) {
        if let Some(commands) = inner.commands.as_mut() {
            if !commands.try_push(cmd) {
                warn!(kind = ?cmd.kind, "command queue full, dropping command");
            }
        }
    }

    fn send_for(&self, handle: SourceHandle, cmd: Command) -> Result<()> {
        let mut inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }
        if inner.registry.get(handle).is_none() {
            return Err(Error::InvalidParam(format!("invalid handle {handle}")));
        }
        Self::send(&mut inner, cmd);
        Ok(())
    }

    fn with_voice<R>(&self, handle: SourceHandle, f: impl FnOnce(&Voice) -> R) -> Result<R> {
        let inner = self.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }
        inner
            .registry
            .get(handle)
            .map(|voice| f(voice.as_ref()))
            .ok_or_else(|| Error::InvalidParam(format!("invalid handle {handle}")))
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        // The audio thread must be stopped before the mixer is torn down.
        self.shutdown();
    }
}
