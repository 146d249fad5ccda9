use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sampler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the sampler engine
///
/// Most of the engine never surfaces these to the audio thread. Opcode
/// errors are recovered while loading regions, queue errors are returned to
/// the caller that tried to enqueue, and worker errors are reported back as
/// a status flag alongside the previous instrument.
#[derive(Debug, Error)]
pub enum Error {
    /// Opcode value cannot be converted to the expected type
    ///
    /// For example `lokey=foo` or `trigger=sometimes`.
    #[error("Invalid value '{0}' for type {1}")]
    InvalidOpcodeValue(String, String),

    /// Opcode name is not known to the region model
    #[error("Unknown opcode '{0}'")]
    UnknownOpcode(String),

    /// Opcode carries a numeric parameter outside of its legal range
    ///
    /// This happens with CC-indexed opcodes such as `locc600` or with
    /// out-of-range filter and EQ band indices such as `eq9_gain`.
    #[error("Invalid parameter {parameter} for opcode '{opcode}'")]
    InvalidParameter {
        /// Opcode name as written
        opcode: String,
        /// Offending parameter value
        parameter: u32,
    },

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message does not fit in the lock-free queue
    ///
    /// The producer must back off and retry later; nothing was written.
    #[error("Message of {size} bytes does not fit in {free} free bytes")]
    QueueFull {
        /// Size of the frame including its header
        size: usize,
        /// Free space left in the queue
        free: usize,
    },

    /// Another thread is writing to the queue
    ///
    /// Only returned by non-blocking sends.
    #[error("Message queue is busy")]
    QueueBusy,

    /// Queue content does not match the frame header that announced it
    #[error("Message queue out of sync: {0}")]
    QueueDesync(String),

    /// Path cannot be carried by a queue frame
    #[error("Path {0:?} is not valid UTF-8")]
    InvalidPath(PathBuf),

    /// Frame header names a message type nobody knows how to decode
    #[error("Unknown message type {0}")]
    UnknownMessage(u32),

    /// Worker thread failure
    #[error("Worker error: {0}")]
    Worker(String),

    /// Instrument could not be loaded
    #[error("Failed to load instrument {path:?}: {reason}")]
    InstrumentLoad {
        /// Path that was requested
        path: PathBuf,
        /// Loader-provided reason
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
