//! Error types for the mixing engine

use thiserror::Error;

/// Errors raised while acquiring a decoded sound buffer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("failed to decode '{name}': {reason}")]
    DecodeFailure { name: String, reason: String },
}

/// Errors raised by the channel registry
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("channel capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },
}

/// Errors raised by an audio output backend
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("output stream error: {0}")]
    Stream(String),
}

/// Errors surfaced by the mixing engine façade
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("failed to decode '{name}': {reason}")]
    DecodeFailure { name: String, reason: String },
    #[error("channel capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },
    #[error("audio engine is not running: {0}")]
    EngineNotRunning(String),
    #[error("no such channel: {0}")]
    ChannelNotFound(u64),
    #[error("engine service has stopped")]
    ServiceStopped,
}

impl From<LoadError> for EngineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::AssetNotFound(name) => EngineError::AssetNotFound(name),
            LoadError::DecodeFailure { name, reason } => EngineError::DecodeFailure { name, reason },
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CapacityExceeded { max } => EngineError::CapacityExceeded { max },
        }
    }
}

impl From<OutputError> for EngineError {
    fn from(err: OutputError) -> Self {
        EngineError::EngineNotRunning(err.to_string())
    }
}
