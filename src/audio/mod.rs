//! Realtime audio primitives: arena, clock, SIMD kernels, and core types.

pub mod arena;
pub mod clock;
pub mod simd;
pub mod types;

pub use arena::FrameArena;
pub use clock::{AudioClock, ClockSample};
pub use types::{
    AudioFormat, ClipInfo, CompressionMode, OutputConfig, PlaybackState, ResultCode, SourceBytes,
    SourceHandle, INVALID_HANDLE,
};
