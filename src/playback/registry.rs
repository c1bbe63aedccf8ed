//! Source registry and snapshot publication
//!
//! The control side keeps the authoritative slot table of loaded voices,
//! guarded by the engine's mutex. The audio thread never sees that table:
//! it reads a published snapshot, a double-buffered array of voice
//! references flipped with a single atomic index store.
//!
//! Publication protocol:
//! 1. The control thread rewrites the inactive buffer under the registry
//!    lock, then flips the active index with a release store.
//! 2. The audio thread loads the index with acquire at the top of each
//!    callback and records it as observed.
//! 3. The next publication waits until the audio thread has observed the
//!    previous flip before touching the retired buffer, so no buffer is
//!    rewritten while a callback may still be iterating it.
//!
//! Voice lifetime is handled by the `Arc`s inside the buffers: unloading a
//! voice drops the registry's reference immediately, and the storage is
//! freed once the retired snapshot buffer is rewritten one flip later.

use crate::playback::voice::Voice;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hard cap on concurrently loaded voices. Bounds the mixer's fixed
/// finished-voice array and keeps the per-callback scan small.
pub const MAX_VOICES: usize = 64;

/// Double-buffered snapshot shared with the audio thread.
pub(crate) struct SnapshotShared {
    buffers: [UnsafeCell<Vec<Arc<Voice>>>; 2],

    /// Index of the buffer readers should use
    active: AtomicUsize,

    /// Last index the audio thread picked up at a callback boundary
    observed: AtomicUsize,

    /// Whether an output driver is currently delivering callbacks. When
    /// false there is no concurrent reader and publication need not wait.
    audio_live: AtomicBool,
}

// Buffer access follows the publication protocol above: the control thread
// writes only the buffer no reader can hold, and the flip is an
// acquire/release pair on `active`.
unsafe impl Sync for SnapshotShared {}
unsafe impl Send for SnapshotShared {}

impl SnapshotShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buffers: [UnsafeCell::new(Vec::new()), UnsafeCell::new(Vec::new())],
            active: AtomicUsize::new(0),
            observed: AtomicUsize::new(0),
            audio_live: AtomicBool::new(false),
        })
    }

    /// Pick up the current snapshot at the top of a callback.
    ///
    /// # Safety
    /// Audio thread only, one caller at a time. The returned slice is valid
    /// for the duration of the callback: publication cannot rewrite this
    /// buffer until a later callback observes a newer flip.
    pub unsafe fn acquire(&self) -> &[Arc<Voice>] {
        let index = self.active.load(Ordering::Acquire);
        self.observed.store(index, Ordering::Release);
        (*self.buffers[index].get()).as_slice()
    }

    /// Publish a new voice set (control thread, under the registry lock).
    pub fn publish(&self, voices: &[Arc<Voice>]) {
        let active = self.active.load(Ordering::Relaxed);
        let inactive = active ^ 1;

        // Wait for the audio thread to pick up the previous flip; until it
        // does, a callback may still be iterating the retired buffer.
        while self.audio_live.load(Ordering::Acquire)
            && self.observed.load(Ordering::Acquire) != active
        {
            std::thread::sleep(Duration::from_micros(200));
        }

        unsafe {
            let buffer = &mut *self.buffers[inactive].get();
            buffer.clear();
            buffer.extend(voices.iter().cloned());
        }
        self.active.store(inactive, Ordering::Release);
    }

    pub fn set_audio_live(&self, live: bool) {
        if live {
            // A fresh driver has not observed anything yet; seed observed
            // with the current index so the first publication can proceed.
            self.observed
                .store(self.active.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.audio_live.store(live, Ordering::Release);
    }
}

/// Control-side slot table mapping handles to voices.
///
/// Mutated only under the engine mutex. Handles are slot indices; a slot is
/// vacated on unload and may be reassigned afterwards, with the per-load
/// generation distinguishing reuses.
pub struct SourceRegistry {
    slots: Vec<Option<Arc<Voice>>>,
    next_generation: u32,
    snapshot: Arc<SnapshotShared>,
}

impl SourceRegistry {
    pub(crate) fn new(snapshot: Arc<SnapshotShared>) -> Self {
        Self {
            slots: Vec::new(),
            next_generation: 1,
            snapshot,
        }
    }

    /// Claim a slot and generation for a new load. Returns `None` when the
    /// voice limit is reached.
    pub fn allocate_slot(&mut self) -> Option<(i32, u32)> {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(vacant) => vacant,
            None if self.slots.len() < MAX_VOICES => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return None,
        };

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);
        Some((index as i32, generation))
    }

    /// Install a voice into its pre-allocated slot and republish.
    pub fn insert(&mut self, voice: Arc<Voice>) {
        let index = voice.handle as usize;
        debug!(handle = voice.handle, generation = voice.generation, "registering voice");
        self.slots[index] = Some(voice);
        self.publish();
    }

    /// Vacate a slot, republish, and hand back the removed voice.
    pub fn remove(&mut self, handle: i32) -> Option<Arc<Voice>> {
        let voice = self
            .slots
            .get_mut(handle as usize)
            .and_then(Option::take)?;
        debug!(handle, "unregistering voice");
        self.publish();
        Some(voice)
    }

    pub fn get(&self, handle: i32) -> Option<&Arc<Voice>> {
        if handle < 0 {
            return None;
        }
        self.slots.get(handle as usize).and_then(Option::as_ref)
    }

    /// Iterate live voices.
    pub fn voices(&self) -> impl Iterator<Item = &Arc<Voice>> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all voices and publish an empty snapshot.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.publish();
    }

    fn publish(&self) {
        let voices: Vec<Arc<Voice>> = self.voices().cloned().collect();
        self.snapshot.publish(&voices);
    }
}
