//! Error types for the click automation engine

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine
///
/// Only load-time problems (corrupt assets, bad configuration) are meant to be
/// fatal. Runtime problems such as a failed capture are reported through this
/// type but callers are expected to log them and keep polling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An embedded template is not valid base64
    #[error("template '{sequence}/{action}' is not valid base64: {source}")]
    InvalidBase64 {
        sequence: String,
        action: String,
        #[source]
        source: base64::DecodeError,
    },

    /// An embedded template could not be decoded as an image
    #[error("failed to decode template '{sequence}/{action}': {source}")]
    Decode {
        sequence: String,
        action: String,
        #[source]
        source: image::ImageError,
    },

    /// Screen or window capture failed
    #[error("capture failed: {0}")]
    Capture(String),

    /// Click dispatch failed
    #[error("click dispatch failed: {0}")]
    Input(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The orchestrator worker is already running
    #[error("worker already running")]
    AlreadyRunning,

    /// The worker thread died and took the detector with it
    #[error("worker thread panicked; detector lost")]
    WorkerLost,

    /// Nothing to run (no sequences or none enabled)
    #[error("nothing to run: {0}")]
    NothingToRun(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a capture error from anything printable
    pub fn capture(message: impl std::fmt::Display) -> Self {
        EngineError::Capture(message.to_string())
    }

    /// Create an input error from anything printable
    pub fn input(message: impl std::fmt::Display) -> Self {
        EngineError::Input(message.to_string())
    }

    /// Whether this error means the bundled assets are unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidBase64 { .. } | EngineError::Decode { .. }
        )
    }
}
