//! Error types for vitrine-kiosk
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the kiosk
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or runtime setting parse errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transport-level HTTP failures (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    /// Malformed data received from the backend
    #[error("Invalid backend payload: {0}")]
    Payload(String),

    /// Playback record rejected before queueing
    #[error("Validation error: {0}")]
    Validation(String),

    /// Media cache failures (download, verify, commit)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Pairing handshake errors
    #[error("Pairing error: {0}")]
    Pairing(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from vitrine-common
    #[error(transparent)]
    Common(#[from] vitrine_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the kiosk Error
pub type Result<T> = std::result::Result<T, Error>;
