//! DSP audio clock
//!
//! Monotonic frame counter advanced by the audio thread at the end of every
//! callback, paired with a wall-clock timestamp so the control thread can
//! interpolate playback time between callbacks with sub-callback precision.
//!
//! The (frames, timestamp) pair is protected by a sequence lock: the writer
//! brackets its stores with an odd/even sequence number, and readers retry
//! until they observe the same even sequence on both sides of the read. The
//! writer never waits; a reader retries only while a write is in flight.

use std::sync::atomic::{fence, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Nanoseconds on a process-local monotonic timeline.
///
/// `Instant` has no absolute value, so all readings are measured against a
/// lazily-pinned process epoch.
fn monotonic_ns() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    Instant::now().duration_since(epoch).as_nanos() as i64
}

/// A consistent snapshot of the clock pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    /// Total output frames processed
    pub frames: i64,

    /// Monotonic timestamp (ns) at the last callback end; 0 if never written
    pub timestamp_ns: i64,
}

/// Seqlock-protected DSP clock.
///
/// Exactly one writer (the audio thread, via [`AudioClock::advance`]); any
/// number of readers.
pub struct AudioClock {
    /// Output sample rate in Hz; set at initialization
    sample_rate: AtomicU32,

    /// Callback buffer size in frames; bounds time extrapolation
    buffer_size: AtomicU32,

    /// Sequence number: odd while a write is in progress
    seq: AtomicU64,

    dsp_frames: AtomicI64,
    timestamp_ns: AtomicI64,
}

impl AudioClock {
    pub fn new(sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            sample_rate: AtomicU32::new(sample_rate),
            buffer_size: AtomicU32::new(buffer_size),
            seq: AtomicU64::new(0),
            dsp_frames: AtomicI64::new(0),
            timestamp_ns: AtomicI64::new(0),
        }
    }

    /// Advance the clock by `frames` at the end of a callback.
    ///
    /// Audio-thread only. Stores are bracketed by the sequence number: the
    /// release fence after the odd store keeps the data writes inside the
    /// bracket, and the release store of the even value publishes them.
    pub fn advance(&self, frames: usize) {
        let s = self.seq.load(Ordering::Relaxed);
        self.seq.store(s.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let current = self.dsp_frames.load(Ordering::Relaxed);
        self.dsp_frames
            .store(current + frames as i64, Ordering::Relaxed);
        self.timestamp_ns.store(monotonic_ns(), Ordering::Relaxed);

        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    /// Read a consistent (frames, timestamp) pair, retrying while the writer
    /// is mid-update. Never returns a torn pair.
    pub fn read(&self) -> ClockSample {
        loop {
            let s0 = self.seq.load(Ordering::Acquire);
            if s0 & 1 != 0 {
                std::hint::spin_loop();
                continue; // write in progress
            }

            let frames = self.dsp_frames.load(Ordering::Relaxed);
            let timestamp_ns = self.timestamp_ns.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == s0 {
                return ClockSample {
                    frames,
                    timestamp_ns,
                };
            }
            std::hint::spin_loop();
        }
    }

    /// Interpolated DSP time in seconds.
    ///
    /// Between callbacks the time advances smoothly with the wall clock,
    /// clamped to at most two buffer periods (50 ms when the buffer size is
    /// unset) so a stalled audio thread cannot run the reported time ahead.
    /// Resynchronizes on the writer's next update.
    pub fn time_seconds(&self) -> f64 {
        let sample_rate = self.sample_rate.load(Ordering::Relaxed);
        if sample_rate == 0 {
            return 0.0;
        }

        let sample = self.read();
        let base = sample.frames as f64 / sample_rate as f64;
        if sample.timestamp_ns == 0 {
            return base; // never written
        }

        let elapsed = (monotonic_ns() - sample.timestamp_ns) as f64 * 1e-9;
        let buffer_size = self.buffer_size.load(Ordering::Relaxed);
        let max_elapsed = if buffer_size > 0 {
            2.0 * buffer_size as f64 / sample_rate as f64
        } else {
            0.05
        };

        base + elapsed.clamp(0.0, max_elapsed)
    }

    /// Raw DSP frame count, no wall-clock interpolation.
    pub fn frames(&self) -> i64 {
        self.dsp_frames.load(Ordering::Relaxed)
    }

    /// Rewind to zero (control thread, while the audio thread is stopped).
    pub fn reset(&self) {
        self.dsp_frames.store(0, Ordering::Relaxed);
        self.timestamp_ns.store(0, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn set_buffer_size(&self, frames: u32) {
        self.buffer_size.store(frames, Ordering::Relaxed);
    }
}
