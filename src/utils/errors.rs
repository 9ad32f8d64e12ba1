//! Engine error types
//!
//! One error enum covers the whole pipeline. Components wrap collaborator
//! failures into the matching variant with `map_err`; no failure here is
//! fatal to the pipeline as a whole.

use thiserror::Error;

/// Errors produced by the recording/replay engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Producer-side capture failure (logged, never halts capture)
    #[error("capture failed: {0}")]
    Capture(String),

    /// Flush/serialization/delivery failure (batch preserved and retried)
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Session issuance failure (deliveries queue until resolved)
    #[error("session unavailable: {0}")]
    Session(String),

    /// Malformed or missing segment during timeline reconstruction
    #[error("aggregation failed: {0}")]
    Aggregation(String),

    /// A record's replay effect failed (logged, playback continues)
    #[error("playback failed: {0}")]
    Playback(String),

    /// zstd encode/decode failure
    #[error("compression failed: {0}")]
    Compression(String),

    /// SQLite or filesystem failure
    #[error("storage failed: {0}")]
    Storage(String),

    /// Configuration load failure
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;
