// Error handling for the ambient sound engine

use std::fmt;

/// Engine error types
#[derive(Debug, Clone)]
pub enum AudioError {
    /// Failed to initialize the engine or the platform audio session
    InitializationError(String),

    /// Clip could not be fetched or decoded
    LoadError(String),

    /// Remote identifier could not be resolved to a download URL
    ResolutionError(String),

    /// Bounded duration polling exhausted; a loop cannot start without it
    DurationUnresolved(String),

    /// Backend call against a handle that is no longer loaded
    InvalidHandle(String),

    /// Playback error
    PlaybackError(String),

    /// Invalid state transition
    InvalidState(String),

    /// Audio device error (hardware issues)
    DeviceError(String),

    /// Decoding error
    DecodingError(String),

    /// Network error (resolution/download)
    NetworkError(String),

    /// IO error
    IoError(String),

    /// Generic error
    Other(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudioError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),
            AudioError::LoadError(msg) => write!(f, "Load error: {}", msg),
            AudioError::ResolutionError(msg) => write!(f, "Resolution error: {}", msg),
            AudioError::DurationUnresolved(msg) => write!(f, "Duration unresolved: {}", msg),
            AudioError::InvalidHandle(msg) => write!(f, "Invalid handle: {}", msg),
            AudioError::PlaybackError(msg) => write!(f, "Playback error: {}", msg),
            AudioError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            AudioError::DeviceError(msg) => write!(f, "Device error: {}", msg),
            AudioError::DecodingError(msg) => write!(f, "Decoding error: {}", msg),
            AudioError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AudioError::IoError(msg) => write!(f, "IO error: {}", msg),
            AudioError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AudioError>;

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AudioError {
    fn from(err: serde_json::Error) -> Self {
        AudioError::Other(format!("JSON error: {}", err))
    }
}
