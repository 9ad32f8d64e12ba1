//! Persistence
//!
//! SQLite-backed session/segment store plus the ingest service that fronts
//! it for the relay.

pub mod ingest;
pub mod store;

pub use ingest::IngestService;
pub use store::{SegmentRow, SegmentStore, SessionOverview, SessionRow, StorageConfig};
