//! Event queue: audio thread -> control thread
//!
//! Events are enqueued from the audio callback without allocation and
//! drained by the control thread through `poll_event`. A full queue drops
//! the event silently — losing a notification must never stall the callback.

use crate::audio::types::SourceHandle;
use crate::playback::ring_buffer::{Consumer, Producer, SpscRing};

/// Event queue slot count. The callback rarely produces more than a few
/// events per buffer.
pub const EVENT_QUEUE_CAPACITY: usize = 512;

/// What happened on the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    Noop = 0,

    /// Voice completed playback (non-loop)
    VoiceFinished,

    /// Voice looped back to its start
    LoopPoint,

    /// A user-defined marker was reached
    Marker,

    /// Output device disconnected
    DeviceLost,

    /// Output device reconnected
    DeviceRestored,

    /// Decode could not keep up with the callback deadline
    BufferUnderrun,
}

/// Fixed-size event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub kind: EventKind,

    /// Originating voice (-1 for engine-wide events)
    pub voice: SourceHandle,

    /// Load generation of the voice, to detect stale handles
    pub generation: u32,

    /// Marker index or error code
    pub param: i32,
}

impl Event {
    pub fn voice_finished(voice: SourceHandle, generation: u32) -> Self {
        Self {
            kind: EventKind::VoiceFinished,
            voice,
            generation,
            param: 0,
        }
    }

    pub fn loop_point(voice: SourceHandle, generation: u32) -> Self {
        Self {
            kind: EventKind::LoopPoint,
            voice,
            generation,
            param: 0,
        }
    }

    pub fn device_lost() -> Self {
        Self {
            kind: EventKind::DeviceLost,
            voice: -1,
            generation: 0,
            param: 0,
        }
    }

    pub fn device_restored() -> Self {
        Self {
            kind: EventKind::DeviceRestored,
            voice: -1,
            generation: 0,
            param: 0,
        }
    }
}

/// Producer half of the event queue (audio side).
pub type EventProducer = Producer<Event>;

/// Consumer half of the event queue (control side).
pub type EventConsumer = Consumer<Event>;

/// Create the event queue pair.
pub fn event_queue() -> (EventProducer, EventConsumer) {
    SpscRing::new(EVENT_QUEUE_CAPACITY).split()
}
