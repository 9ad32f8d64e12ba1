//! Timeline reconstruction
//!
//! Turns an ordered list of stored segments into one normalized timeline:
//! pages, a global event order with resolved durations, and the sorted
//! type/name sets the dashboard renders from.

pub mod aggregator;

use crate::capture::{EventRecord, FlushSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use aggregator::aggregate;

/// Page boundary extracted at ingest time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMarker {
    /// Index of the page-opening record within its segment
    pub buffer_event_idx: usize,

    /// Document URL at the boundary
    pub url: Option<String>,

    /// Boundary time, milliseconds since epoch
    pub start_time: i64,
}

/// One stored segment, decoded: its page markers and the batches it carried
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentRecording {
    pub pages: Vec<PageMarker>,
    pub event_buffer: Vec<FlushSnapshot>,
    pub duration: i64,
    pub has_error: bool,
}

/// Direction of heap usage between consecutive records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTrend {
    pub is_up: bool,
    pub is_down: bool,
}

/// One page of the reconstructed timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePage {
    pub idx: usize,
    pub url: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub has_errors: bool,
}

/// One event of the reconstructed timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub record: EventRecord,

    /// Global page index the event belongs to
    pub page_idx: usize,

    /// Position in the final event order
    pub event_idx: usize,

    /// Resolved duration: gap to the following record, or the remaining
    /// overlap for synthetic copies
    pub duration: i64,

    /// Heap delta versus the previous record, when both carried samples
    pub memory_trend: Option<MemoryTrend>,

    /// Set on synthetic copies of async events that span page boundaries
    pub is_page_overlap: bool,

    /// For overlap copies, the index of the record they were split from
    pub original_event_idx: Option<usize>,

    /// Set when a record's remaining overlap extends past its page's end
    pub overflows_page: bool,
}

/// Reconstructed session timeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub pages: Vec<TimelinePage>,
    pub events: Vec<TimelineEvent>,

    /// Indices into `events` for error records
    pub errors: Vec<usize>,

    /// Composite event types seen, lexically sorted
    pub event_types: BTreeSet<String>,

    /// Node names seen on element/document nodes, lowercased and sorted
    pub node_names: BTreeSet<String>,

    pub first_time: i64,
    pub last_time: i64,
    pub duration: i64,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
