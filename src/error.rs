//! Error types for the mixer engine
//!
//! Control-path operations return `Result<T, Error>`; the numeric result
//! codes of the embedding surface are derived via [`Error::code`]. The audio
//! thread never constructs or propagates these — realtime anomalies surface
//! as events or counters instead.

use crate::audio::types::ResultCode;
use thiserror::Error;

/// Main error type for the engine control surface
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument (bad handle, bad range, empty input)
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Operation requires an initialized engine
    #[error("Engine not initialized")]
    NotInitialized,

    /// Initialize called on an already-initialized engine
    #[error("Engine already initialized")]
    AlreadyInitialized,

    /// No decoder in the chain accepted the data
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Output device setup or stream error
    #[error("Audio output error: {0}")]
    OutputFailed(String),

    /// Memory budget exceeded
    #[error("Out of memory: requested {requested} bytes, budget has {available} free")]
    OutOfMemory { requested: usize, available: usize },

    /// File could not be located
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Recognized container but unsupported stream format
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    /// Configuration load/parse errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors from file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map to the numeric result code exposed on the control surface.
    pub fn code(&self) -> ResultCode {
        match self {
            Error::InvalidParam(_) => ResultCode::InvalidParam,
            Error::NotInitialized => ResultCode::NotInitialized,
            Error::AlreadyInitialized => ResultCode::AlreadyInitialized,
            Error::DecodeFailed(_) => ResultCode::DecodeFailed,
            Error::OutputFailed(_) => ResultCode::OutputFailed,
            Error::OutOfMemory { .. } => ResultCode::OutOfMemory,
            Error::FileNotFound(_) => ResultCode::FileNotFound,
            Error::FormatNotSupported(_) => ResultCode::FormatNotSupported,
            Error::Config(_) => ResultCode::InvalidParam,
            Error::Io(_) => ResultCode::FileNotFound,
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
