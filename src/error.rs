//! # Error Handling
//!
//! This module defines the error type shared by the protocol, audio and
//! transcription layers.
//!
//! ## Propagation policy:
//! The event dispatcher recovers nothing locally. Every fault below surfaces
//! to the connection loop in `server.rs`, which logs it and closes the
//! connection. The client sees a closed socket and no transcript.
//!
//! ## Error Categories:
//! - **Config**: Bad configuration file, environment variable or CLI flag
//! - **Protocol**: Oversized or truncated Wyoming frames
//! - **Audio**: Chunk metadata that cannot be normalized
//! - **Container**: WAV wrapping/unwrapping failed
//! - **Inference**: The speech engine failed or is not loaded
//! - **Io**: Socket or filesystem errors

use std::fmt;

/// Errors produced while serving a Wyoming connection.
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::Audio("sample width must be 1-4 bytes".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Configuration file, environment variable or CLI problems
    Config(String),

    /// Malformed framing on the wire
    Protocol(String),

    /// Audio chunk could not be converted to the canonical format
    Audio(String),

    /// WAV container could not be written or read back
    Container(String),

    /// Speech engine failure (model error, missing model, worker panic)
    Inference(String),

    /// Underlying I/O error (socket closed mid-frame, bind failure, ...)
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            AppError::Audio(msg) => write!(f, "Audio error: {}", msg),
            AppError::Container(msg) => write!(f, "Container error: {}", msg),
            AppError::Inference(msg) => write!(f, "Inference error: {}", msg),
            AppError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl AppError {
    /// Whether this error only means the peer went away.
    ///
    /// Dropped connections are a normal end of a session, not a fault, so the
    /// connection loop logs them at debug level instead of error.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AppError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

/// JSON errors only come from event data blocks, so they are protocol errors.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(format!("invalid JSON: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<candle_core::Error> for AppError {
    fn from(err: candle_core::Error) -> Self {
        AppError::Inference(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
