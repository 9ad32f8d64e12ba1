//! Event capture model and buffering
//!
//! - **Event**: tagged, timestamped records with opaque payloads
//! - **Buffer**: time-ordered buffer owning the flush-trigger policy
//! - **Context**: per-session capture state (origin, payload dedup)

pub mod buffer;
pub mod context;
pub mod event;

pub use buffer::{FlushSnapshot, SessionBuffer};
pub use context::CaptureContext;
pub use event::{EventKind, EventRecord, MemorySample};
