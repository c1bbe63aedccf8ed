//! Per-voice source record
//!
//! One `Voice` per loaded source, shared between the control thread and the
//! audio thread. The control side mutates the record only through its atomic
//! fields; the decoder is owned by the audio thread once the voice is
//! published, with control-side seeks routed through the command queue.

use crate::audio::types::{ClipInfo, PlaybackState, SourceBytes, SourceHandle};
use crate::decoder::Decoder;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Interior-mutable cell for state owned by the audio thread.
///
/// Shared references to the container may live on any thread, but the cell
/// contents must only be touched from the single thread that owns the
/// realtime side (plus the control thread in windows where the audio thread
/// is provably not running, e.g. before publication or after shutdown).
pub(crate) struct AudioCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for AudioCell<T> {}

impl<T> AudioCell<T> {
    pub fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    pub fn get(&self) -> *mut T {
        self.0.get()
    }
}

/// A loaded source as both threads see it.
pub struct Voice {
    /// Stable handle assigned at load
    pub handle: SourceHandle,

    /// Load generation, distinguishes reuses of the same slot
    pub generation: u32,

    /// Immutable clip metadata
    pub clip: ClipInfo,

    /// Source bytes the decoder may reference. `None` once the clip has
    /// been fully pre-decoded and the compressed form released.
    data: Option<Arc<SourceBytes>>,

    /// Compressed bytes charged to the memory budget for this voice
    pub budget_compressed: usize,

    /// Decoded bytes charged to the memory budget for this voice
    pub budget_decoded: usize,

    /// Decoder instance; audio-thread-owned after publication
    decoder: AudioCell<Decoder>,

    state: AtomicU8,
    volume_bits: AtomicU32,
    pan_bits: AtomicU32,
    looping: AtomicBool,

    /// Volume fade: target (f32 bits) and frames left on the ramp,
    /// consumed by the mixer one callback at a time
    fade_target_bits: AtomicU32,
    fade_frames_left: AtomicU64,
}

impl Voice {
    pub fn new(
        handle: SourceHandle,
        generation: u32,
        clip: ClipInfo,
        data: Option<Arc<SourceBytes>>,
        decoder: Decoder,
    ) -> Self {
        Self {
            handle,
            generation,
            clip,
            data,
            budget_compressed: 0,
            budget_decoded: 0,
            decoder: AudioCell::new(decoder),
            state: AtomicU8::new(PlaybackState::Stopped.as_u8()),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            pan_bits: AtomicU32::new(0.0f32.to_bits()),
            looping: AtomicBool::new(false),
            fade_target_bits: AtomicU32::new(1.0f32.to_bits()),
            fade_frames_left: AtomicU64::new(0),
        }
    }

    /// Borrow the decoder mutably.
    ///
    /// # Safety
    /// Only the audio thread may call this once the voice is published in a
    /// snapshot, and only one such borrow may exist at a time. The control
    /// thread may use it before publication (load) or after the audio
    /// thread has stopped (shutdown).
    pub unsafe fn decoder_mut(&self) -> &mut Decoder {
        &mut *self.decoder.get()
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Linear gain, `>= 0`.
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(volume.max(0.0).to_bits(), Ordering::Relaxed);
    }

    /// Pan position in [-1, +1].
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }

    /// Stores clamp to [-1, +1].
    pub fn set_pan(&self, pan: f32) {
        self.pan_bits
            .store(pan.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Arm a volume fade toward `target` over `frames` output frames.
    pub fn begin_fade(&self, target: f32, frames: u64) {
        if frames == 0 {
            self.set_volume(target);
            self.fade_frames_left.store(0, Ordering::Relaxed);
            return;
        }
        self.fade_target_bits
            .store(target.max(0.0).to_bits(), Ordering::Relaxed);
        self.fade_frames_left.store(frames, Ordering::Relaxed);
    }

    /// Step an armed fade forward by one callback's worth of frames.
    /// Audio-thread only (fields are atomics, but the read-modify-write is
    /// single-writer).
    pub fn apply_fade(&self, block_frames: u64) {
        let left = self.fade_frames_left.load(Ordering::Relaxed);
        if left == 0 {
            return;
        }

        let target = f32::from_bits(self.fade_target_bits.load(Ordering::Relaxed));
        if left <= block_frames {
            self.set_volume(target);
            self.fade_frames_left.store(0, Ordering::Relaxed);
        } else {
            let current = self.volume();
            let step = block_frames as f32 / left as f32;
            self.set_volume(current + (target - current) * step);
            self.fade_frames_left
                .store(left - block_frames, Ordering::Relaxed);
        }
    }

    /// Whether the compressed source bytes are still held.
    pub fn holds_source_bytes(&self) -> bool {
        self.data.is_some()
    }
}

// The decoder cell is the only non-Sync field; access to it follows the
// single-audio-thread protocol documented on `decoder_mut`.
unsafe impl Send for Voice {}
unsafe impl Sync for Voice {}
