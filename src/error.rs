//! # Error Types
//!
//! Custom error types for Rover Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Rover Bridge
#[derive(Debug, Error)]
pub enum RoverBridgeError {
    /// Control map failed validation (fatal at startup, all-or-nothing)
    #[error("control map error: {0}")]
    ControlMap(String),

    /// JSON errors (control map document, command envelopes)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Application configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Gamepad device errors (disconnects, read failures)
    #[error("controller error: {0}")]
    Controller(String),

    /// No gamepad device found on the system
    #[error("no gamepad found")]
    ControllerNotFound,

    /// Command sink errors (transport seam)
    #[error("command sink error: {0}")]
    Sink(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Rover Bridge
pub type Result<T> = std::result::Result<T, RoverBridgeError>;
