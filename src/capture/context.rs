//! Per-session capture context
//!
//! Carries the mutable state the capture side needs across events: the
//! profiled origin, the last reported document ready state, and the last
//! stylesheet/snapshot bodies used to strip repeated bulky payload fields.
//! All of this is explicit per-session state passed through the pipeline,
//! never process-wide.

use crate::capture::event::{EventKind, EventRecord};
use serde_json::Value;

/// Capture-session state threaded through the recording pipeline
#[derive(Debug, Default)]
pub struct CaptureContext {
    /// Origin URL of the profiled site (from the profiler load event)
    pub origin: Option<String>,

    /// Capture options reported by the profiler load event
    pub options: Value,

    /// Last known document ready state
    pub ready_state: Option<String>,

    /// Last stylesheet body seen, for payload dedup
    style_sheets: Option<String>,

    /// Last full document snapshot seen, for payload dedup
    snapshot: Option<String>,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb session-level fields and strip redundant payload data.
    ///
    /// Profiler load events establish the origin and options. For all other
    /// events, stylesheet bodies and repeated document snapshots are removed
    /// from the opaque payload so they are shipped at most once.
    pub fn prepare(&mut self, record: &mut EventRecord) {
        if let Some(state) = record.payload.get("ready_state").and_then(Value::as_str) {
            self.ready_state = Some(state.to_string());
        }

        if record.kind == EventKind::Profiler
            && record.event_type.as_deref() == Some("load")
        {
            self.origin = record.url.clone();
            if let Some(options) = record.payload.get("options") {
                self.options = options.clone();
            }
            return;
        }

        let Some(payload) = record.payload.as_object_mut() else {
            return;
        };

        if let Some(sheets) = payload.get("style_sheets") {
            let body = sheets.to_string();
            if self.style_sheets.as_deref() != Some(body.as_str()) {
                self.style_sheets = Some(body);
            }
            payload.remove("style_sheets");
        }

        let is_document = payload
            .get("is_document")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_document {
            if let Some(snap) = payload.get("snapshot").and_then(Value::as_str) {
                if self.snapshot.as_deref() == Some(snap) {
                    // repeated snapshot, drop it from the payload
                    payload.remove("snapshot");
                } else {
                    self.snapshot = Some(snap.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_event_sets_origin_and_options() {
        let mut ctx = CaptureContext::new();
        let mut rec = EventRecord::new(EventKind::Profiler, 0)
            .with_event_type("load")
            .with_url("https://example.com")
            .with_payload(json!({"options": {"sample": true}}));

        ctx.prepare(&mut rec);
        assert_eq!(ctx.origin.as_deref(), Some("https://example.com"));
        assert_eq!(ctx.options["sample"], true);
    }

    #[test]
    fn test_stylesheets_are_stripped() {
        let mut ctx = CaptureContext::new();
        let mut rec = EventRecord::new(EventKind::Mutation, 10)
            .with_payload(json!({"style_sheets": ["body{}"], "target": 3}));

        ctx.prepare(&mut rec);
        assert!(rec.payload.get("style_sheets").is_none());
        assert_eq!(rec.payload["target"], 3);
    }

    #[test]
    fn test_repeated_snapshot_dropped_changed_snapshot_kept() {
        let mut ctx = CaptureContext::new();

        let mut first = EventRecord::new(EventKind::Dom, 10)
            .with_payload(json!({"is_document": true, "snapshot": "<html/>"}));
        ctx.prepare(&mut first);
        assert_eq!(first.payload["snapshot"], "<html/>");

        let mut repeat = EventRecord::new(EventKind::Dom, 20)
            .with_payload(json!({"is_document": true, "snapshot": "<html/>"}));
        ctx.prepare(&mut repeat);
        assert!(repeat.payload.get("snapshot").is_none());

        let mut changed = EventRecord::new(EventKind::Dom, 30)
            .with_payload(json!({"is_document": true, "snapshot": "<html>x</html>"}));
        ctx.prepare(&mut changed);
        assert_eq!(changed.payload["snapshot"], "<html>x</html>");
    }

    #[test]
    fn test_ready_state_tracked() {
        let mut ctx = CaptureContext::new();
        let mut rec = EventRecord::new(EventKind::Dom, 10)
            .with_payload(json!({"ready_state": "interactive"}));
        ctx.prepare(&mut rec);
        assert_eq!(ctx.ready_state.as_deref(), Some("interactive"));
    }
}
