//! Session Replay Engine Library
//!
//! Records browser-style event sessions, ships them as compressed segments,
//! and reconstructs them into replayable timelines.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **capture**: Ordered event buffering with error-aware flush thresholds
//! - **relay**: Batch compression, session issuance, and delivery retry
//! - **storage**: SQLite-backed session/segment persistence and ingestion
//! - **timeline**: Aggregation of stored segments into one timeline
//! - **playback**: Real-time replay scheduling with pluggable effects
//! - **stream**: Look-ahead paced segment streaming to viewers
//! - **observability**: Tracing and logging
//! - **utils**: Configuration, errors, and timer helpers

pub mod capture;
pub mod observability;
pub mod playback;
pub mod relay;
pub mod storage;
pub mod stream;
pub mod timeline;
pub mod utils;

// Re-export commonly used types
pub use capture::{EventKind, EventRecord, SessionBuffer};
pub use relay::{RecordingPipeline, SessionBackend, SessionRequest, SessionTicket};
pub use storage::{IngestService, SegmentStore};
pub use timeline::{aggregate, Timeline};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
