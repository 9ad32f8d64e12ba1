//! Captured event model
//!
//! Events arrive from capture collaborators (DOM, XHR, console, error
//! handlers) as a tagged variant with an opaque payload. The engine only
//! times, sorts, and copies the payload; interpretation stays with the
//! capture-specific collaborator that produced it.

use serde::{Deserialize, Serialize};

/// DOM node type for element nodes
pub const ELEMENT_NODE: i32 = 1;

/// DOM node type for document nodes
pub const DOCUMENT_NODE: i32 = 9;

/// Capture source of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Dom,
    Mutation,
    Xhr,
    Error,
    Console,
    Profiler,
    List,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Dom => "dom",
            EventKind::Mutation => "mutation",
            EventKind::Xhr => "xhr",
            EventKind::Error => "error",
            EventKind::Console => "console",
            EventKind::Profiler => "profiler",
            EventKind::List => "list",
        }
    }
}

/// Browser heap usage sampled at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    pub js_heap_size_limit: u64,
    pub total_js_heap_size: u64,
    pub used_js_heap_size: u64,
}

/// One captured, timestamped event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Capture source
    pub kind: EventKind,

    /// Sub-type reported by the captured event ("click", "load", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Capture time, milliseconds since epoch
    pub time: i64,

    /// Opaque capture-specific body
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Node the event originated on, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<i32>,

    /// Document URL at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Set for history navigations (pushState/popstate)
    #[serde(default)]
    pub is_history_event: bool,

    /// Explicit duration for asynchronous events (XHR, long tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    /// Heap usage sampled alongside the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySample>,

    /// Marks the record that opened a new page (assigned at ingest)
    #[serde(default)]
    pub is_new_page: bool,

    /// Index of the record's page within its own segment (assigned at ingest)
    #[serde(default)]
    pub buffer_page_idx: usize,
}

impl EventRecord {
    /// Create a record with the fields every event carries
    pub fn new(kind: EventKind, time: i64) -> Self {
        Self {
            kind,
            event_type: None,
            time,
            payload: serde_json::Value::Null,
            node_name: None,
            node_type: None,
            url: None,
            is_history_event: false,
            duration: None,
            memory: None,
            is_new_page: false,
            buffer_page_idx: 0,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_node(mut self, name: impl Into<String>, node_type: i32) -> Self {
        self.node_name = Some(name.into());
        self.node_type = Some(node_type);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_memory(mut self, memory: MemorySample) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_history(mut self) -> Self {
        self.is_history_event = true;
        self
    }

    /// Error-kind records flip the buffer into recording mode
    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }

    /// See if this record marks a page boundary (document load or history
    /// navigation)
    pub fn opens_page(&self) -> bool {
        self.is_history_event
            || (self.kind == EventKind::Profiler
                && self.event_type.as_deref() == Some("load"))
    }

    /// Composite type label, e.g. "dom.click" or "error"
    pub fn composite_type(&self) -> String {
        match &self.event_type {
            Some(sub) => format!("{}.{}", self.kind.as_str(), sub),
            None => self.kind.as_str().to_string(),
        }
    }

    /// See if this record's node should be tracked in the timeline's
    /// node-name set (elements and documents only)
    pub fn counts_node_name(&self) -> bool {
        self.node_name.is_some()
            && matches!(self.node_type, Some(ELEMENT_NODE) | Some(DOCUMENT_NODE))
    }
}
