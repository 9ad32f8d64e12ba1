//! Viewer-facing segment streaming

pub mod delivery;

pub use delivery::{SegmentSource, StoredSegment, StreamDeliveryLoop};
