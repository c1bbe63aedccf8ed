//! Command queue: control thread -> audio thread
//!
//! Commands are fixed-size plain-data records pushed by the control surface
//! and drained at the top of every audio callback, before any voice decodes.
//! All commands take effect at the next callback boundary; the
//! `schedule_sample` field is carried for wire compatibility but not applied.

use crate::audio::types::SourceHandle;
use crate::playback::ring_buffer::{Consumer, Producer, SpscRing};

/// Command queue slot count. Sized to absorb a burst of ~1000 commands
/// between callbacks.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Maximum commands a batch can hold before submission.
pub const MAX_BATCH: usize = 64;

/// What a command asks the audio thread to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Noop = 0,
    Play,
    Stop,
    Pause,
    Resume,
    SetVolume,
    SetPitch,
    SetPan,
    SetLoop,
    FadeVolume,
    Seek,
    StopAll,
}

/// Fixed-size command record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Command {
    pub kind: CommandKind,

    /// Addressed voice (-1 for engine-wide commands like StopAll)
    pub voice: SourceHandle,

    /// Primary scalar: volume / pan / loop flag
    pub p0: f32,

    /// Fade target volume
    pub p1: f32,

    /// Fade duration in seconds
    pub duration: f32,

    /// Seek target as a frame index (avoids float precision loss)
    pub seek_frame: i64,

    /// Absolute sample position for deferred scheduling. Carried but
    /// ignored: every command applies at the start of the next callback.
    pub schedule_sample: u64,
}

impl Command {
    pub fn play(voice: SourceHandle) -> Self {
        Self {
            kind: CommandKind::Play,
            voice,
            ..Default::default()
        }
    }

    pub fn stop(voice: SourceHandle) -> Self {
        Self {
            kind: CommandKind::Stop,
            voice,
            ..Default::default()
        }
    }

    pub fn pause(voice: SourceHandle) -> Self {
        Self {
            kind: CommandKind::Pause,
            voice,
            ..Default::default()
        }
    }

    pub fn resume(voice: SourceHandle) -> Self {
        Self {
            kind: CommandKind::Resume,
            voice,
            ..Default::default()
        }
    }

    pub fn set_volume(voice: SourceHandle, volume: f32) -> Self {
        Self {
            kind: CommandKind::SetVolume,
            voice,
            p0: volume,
            ..Default::default()
        }
    }

    pub fn set_pan(voice: SourceHandle, pan: f32) -> Self {
        Self {
            kind: CommandKind::SetPan,
            voice,
            p0: pan,
            ..Default::default()
        }
    }

    pub fn set_loop(voice: SourceHandle, looping: bool) -> Self {
        Self {
            kind: CommandKind::SetLoop,
            voice,
            p0: if looping { 1.0 } else { 0.0 },
            ..Default::default()
        }
    }

    pub fn fade_volume(voice: SourceHandle, target: f32, duration: f32) -> Self {
        Self {
            kind: CommandKind::FadeVolume,
            voice,
            p1: target,
            duration,
            ..Default::default()
        }
    }

    pub fn seek(voice: SourceHandle, frame: i64) -> Self {
        Self {
            kind: CommandKind::Seek,
            voice,
            seek_frame: frame,
            ..Default::default()
        }
    }

    pub fn stop_all() -> Self {
        Self {
            kind: CommandKind::StopAll,
            voice: -1,
            ..Default::default()
        }
    }
}

/// Producer half of the command queue (control side).
pub type CommandProducer = Producer<Command>;

/// Consumer half of the command queue (audio side).
pub type CommandConsumer = Consumer<Command>;

/// Create the command queue pair.
pub fn command_queue() -> (CommandProducer, CommandConsumer) {
    SpscRing::new(COMMAND_QUEUE_CAPACITY).split()
}

/// Control-side batch helper: accumulate commands and submit them in one
/// pass. Submission near a full queue accepts a prefix; the unaccepted tail
/// is discarded and reported through the return count.
#[derive(Debug)]
pub struct CommandBatch {
    commands: [Command; MAX_BATCH],
    count: usize,
}

impl Default for CommandBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBatch {
    pub fn new() -> Self {
        Self {
            commands: [Command::default(); MAX_BATCH],
            count: 0,
        }
    }

    /// Add a command. Silently ignored when the batch is full.
    pub fn add(&mut self, cmd: Command) {
        if self.count < MAX_BATCH {
            self.commands[self.count] = cmd;
            self.count += 1;
        }
    }

    /// Submit the batch, clearing it. Returns the number of commands the
    /// queue accepted.
    pub fn submit(&mut self, queue: &mut CommandProducer) -> usize {
        let pushed = queue.push_slice(&self.commands[..self.count]);
        self.count = 0;
        pushed
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }
}
