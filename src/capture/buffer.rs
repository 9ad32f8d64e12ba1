//! Time-ordered session buffer
//!
//! Holds captured events in non-decreasing timestamp order and owns the
//! flush-trigger policy: error sessions flush in small batches for lower
//! latency, normal sessions batch larger to reduce overhead.

use crate::capture::event::EventRecord;
use crate::utils::config::BufferConfig;

/// Snapshot drained from the buffer by a single `clear()`
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FlushSnapshot {
    /// Error records seen since the last flush
    pub errors: Vec<EventRecord>,

    /// All buffered records, in timestamp order
    pub records: Vec<EventRecord>,
}

impl FlushSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// In-memory ordered buffer of captured events
#[derive(Debug)]
pub struct SessionBuffer {
    records: Vec<EventRecord>,
    errors: Vec<EventRecord>,

    /// Set permanently once an error record is seen
    recording: bool,

    low_threshold: usize,
    high_threshold: usize,

    start_time: i64,
    end_time: i64,
    duration: i64,

    /// Timestamps of the last two records added, newest first
    last_added: [Option<i64>; 2],
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new(&BufferConfig::default())
    }
}

impl SessionBuffer {
    /// Create a buffer with the configured flush thresholds
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
            recording: false,
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            start_time: 0,
            end_time: 0,
            duration: 0,
            last_added: [None, None],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Running duration between the earliest and latest buffered records
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// See if the buffer has collected an error record
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// See if an error record was ever seen in this buffer's lifetime
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn get(&self, index: usize) -> Option<&EventRecord> {
        self.records.get(index)
    }

    /// Insert a record in timestamp order.
    ///
    /// Equal timestamps keep insertion order: the new record lands after
    /// existing records with the same time. Returns the insertion index.
    pub fn add(&mut self, record: EventRecord) -> usize {
        let time = record.time;

        self.start_time = if self.start_time == 0 {
            time
        } else {
            self.start_time.min(time)
        };
        self.end_time = if self.end_time == 0 {
            time
        } else {
            self.end_time.max(time)
        };
        self.duration = self.end_time - self.start_time;

        if record.is_error() {
            self.errors.push(record.clone());
            self.recording = true;
        }

        let index = self.records.partition_point(|r| r.time <= time);
        self.records.insert(index, record);

        self.last_added[1] = self.last_added[0];
        self.last_added[0] = Some(time);

        index
    }

    /// Delta between the two most recently added records' timestamps
    pub fn last_duration(&self) -> i64 {
        match (self.last_added[0], self.last_added[1]) {
            (Some(newest), Some(prior)) => newest - prior,
            _ => 0,
        }
    }

    /// See if the buffer has reached its flush threshold
    pub fn should_flush(&self) -> bool {
        let len = self.records.len();
        if self.recording {
            len >= self.low_threshold
        } else {
            len >= self.high_threshold
        }
    }

    /// Atomically snapshot and reset the buffer.
    ///
    /// The sticky `recording` flag survives for the buffer's lifetime.
    pub fn clear(&mut self) -> FlushSnapshot {
        let snapshot = FlushSnapshot {
            errors: std::mem::take(&mut self.errors),
            records: std::mem::take(&mut self.records),
        };

        self.start_time = 0;
        self.end_time = 0;
        self.duration = 0;
        self.last_added = [None, None];

        snapshot
    }
}
