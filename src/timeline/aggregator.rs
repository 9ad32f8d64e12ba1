//! Segment aggregation
//!
//! Pure function over an ordered (by persistence time) segment list. Safe to
//! run repeatedly or in parallel across sessions; identical input always
//! yields an identical timeline.

use crate::capture::EventRecord;
use crate::timeline::{
    MemoryTrend, SegmentRecording, Timeline, TimelineEvent, TimelinePage,
};

/// Reconstruct one timeline from a session's stored segments.
///
/// Degenerate inputs (no segments, a single record) produce an empty or
/// minimal timeline; malformed pieces are skipped, never a panic.
pub fn aggregate(segments: &[SegmentRecording]) -> Timeline {
    let mut walker = Walker::default();
    for segment in segments {
        walker.walk_segment(segment);
    }
    walker.finish()
}

/// Aggregation state carried across segment boundaries
#[derive(Default)]
struct Walker {
    timeline: Timeline,

    /// Synthetic overlap copies waiting for the first record on their page
    pending_overlaps: Vec<TimelineEvent>,

    /// Index of the previous real record in the output, spanning segments
    prev_idx: Option<usize>,

    first_time: Option<i64>,
    last_time: Option<i64>,
}

impl Walker {
    fn walk_segment(&mut self, segment: &SegmentRecording) {
        // records of this segment index pages relative to their own segment
        let page_offset = self.timeline.pages.len();

        for marker in &segment.pages {
            self.close_last_page(marker.start_time);
            let idx = self.timeline.pages.len();
            self.timeline.pages.push(TimelinePage {
                idx,
                url: marker.url.clone(),
                start_time: marker.start_time,
                end_time: 0,
                duration: 0,
                has_errors: false,
            });
        }

        for batch in &segment.event_buffer {
            for record in &batch.records {
                self.visit(record, page_offset);
            }
        }
    }

    /// Resolve the previous page's end time from the next page's start
    fn close_last_page(&mut self, next_start: i64) {
        if let Some(last) = self.timeline.pages.last_mut() {
            last.end_time = next_start;
            last.duration = last.end_time - last.start_time;
        }
    }

    fn visit(&mut self, record: &EventRecord, page_offset: usize) {
        // records that arrive before any page marker get an implicit page
        if self.timeline.pages.is_empty() {
            self.timeline.pages.push(TimelinePage {
                idx: 0,
                url: record.url.clone(),
                start_time: record.time,
                end_time: 0,
                duration: 0,
                has_errors: false,
            });
        }

        let last_page_idx = self.timeline.pages.len() - 1;
        let page_idx = last_page_idx.min(page_offset + record.buffer_page_idx);

        // the previous record's duration is the gap to this one; the memory
        // trend compares this record's heap sample against the previous one
        let mut memory_trend = None;
        if let Some(prev_idx) = self.prev_idx {
            let prev = &mut self.timeline.events[prev_idx];
            prev.duration = (record.time - prev.record.time).abs();
            if let (Some(cur), Some(before)) = (&record.memory, &prev.record.memory) {
                memory_trend = Some(MemoryTrend {
                    is_up: cur.used_js_heap_size > before.used_js_heap_size,
                    is_down: cur.used_js_heap_size < before.used_js_heap_size,
                });
            }
        }

        self.timeline.event_types.insert(record.composite_type());
        if record.counts_node_name() {
            if let Some(name) = &record.node_name {
                self.timeline.node_names.insert(name.to_lowercase());
            }
        }

        // inject queued overlap copies before the first record on their page
        let due: Vec<TimelineEvent> = {
            let mut due = Vec::new();
            let mut keep = Vec::new();
            for overlap in self.pending_overlaps.drain(..) {
                if overlap.page_idx == page_idx {
                    due.push(overlap);
                } else {
                    keep.push(overlap);
                }
            }
            self.pending_overlaps = keep;
            due
        };
        for mut overlap in due {
            overlap.event_idx = self.timeline.events.len();
            self.timeline.events.push(overlap);
        }

        let event_idx = self.timeline.events.len();
        self.synthesize_overlaps(record, page_idx, event_idx);

        if record.is_error() {
            self.timeline.pages[page_idx].has_errors = true;
            self.timeline.errors.push(event_idx);
        }

        self.timeline.events.push(TimelineEvent {
            record: record.clone(),
            page_idx,
            event_idx,
            duration: 0,
            memory_trend,
            is_page_overlap: false,
            original_event_idx: None,
            overflows_page: false,
        });
        self.prev_idx = Some(event_idx);

        self.first_time.get_or_insert(record.time);
        self.last_time = Some(record.time);
    }

    /// Split an async record across every later page its duration reaches
    fn synthesize_overlaps(&mut self, record: &EventRecord, page_idx: usize, event_idx: usize) {
        let Some(duration) = record.duration.filter(|d| *d > 0) else {
            return;
        };
        let event_end = record.time + duration;

        for later_idx in (page_idx + 1)..self.timeline.pages.len() {
            let later = &self.timeline.pages[later_idx];
            if event_end <= later.start_time {
                continue;
            }

            let overlap_duration = event_end - later.start_time;
            let next_end = self
                .timeline
                .pages
                .get(later_idx + 1)
                .map(|p| p.start_time)
                .unwrap_or(later.end_time);
            let overflows = next_end != 0 && later.start_time + overlap_duration > next_end;

            let mut copy = record.clone();
            copy.time = later.start_time;

            self.pending_overlaps.push(TimelineEvent {
                record: copy,
                page_idx: later_idx,
                event_idx: 0,
                duration: overlap_duration,
                memory_trend: None,
                is_page_overlap: true,
                original_event_idx: Some(event_idx),
                overflows_page: overflows,
            });
        }
    }

    fn finish(mut self) -> Timeline {
        // overlap copies whose page never saw another record still belong in
        // the output, after everything else, in page order
        let mut leftovers = std::mem::take(&mut self.pending_overlaps);
        leftovers.sort_by_key(|overlap| overlap.page_idx);
        for mut overlap in leftovers {
            overlap.event_idx = self.timeline.events.len();
            self.timeline.events.push(overlap);
        }

        self.timeline.first_time = self.first_time.unwrap_or(0);
        self.timeline.last_time = self.last_time.unwrap_or(0);
        self.timeline.duration = self.timeline.last_time - self.timeline.first_time;

        // the last page has no successor; its end is the last event's time
        if let Some(last) = self.timeline.pages.last_mut() {
            if last.end_time == 0 {
                last.end_time = self.timeline.last_time;
                last.duration = last.end_time - last.start_time;
            }
        }

        self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::{EventKind, EventRecord, MemorySample, ELEMENT_NODE};
    use crate::capture::FlushSnapshot;
    use crate::timeline::PageMarker;

    fn record(time: i64) -> EventRecord {
        EventRecord::new(EventKind::Dom, time).with_event_type("click")
    }

    fn segment(pages: Vec<PageMarker>, records: Vec<EventRecord>) -> SegmentRecording {
        SegmentRecording {
            pages,
            event_buffer: vec![FlushSnapshot {
                errors: Vec::new(),
                records,
            }],
            duration: 0,
            has_error: false,
        }
    }

    fn marker(start_time: i64) -> PageMarker {
        PageMarker {
            buffer_event_idx: 0,
            url: Some("https://example.com".into()),
            start_time,
        }
    }

    #[test]
    fn test_empty_input_yields_empty_timeline() {
        let timeline = aggregate(&[]);
        assert!(timeline.is_empty());
        assert!(timeline.pages.is_empty());
        assert_eq!(timeline.duration, 0);
    }

    #[test]
    fn test_single_record_yields_minimal_timeline() {
        let timeline = aggregate(&[segment(vec![], vec![record(250)])]);
        assert_eq!(timeline.events.len(), 1);
        assert_eq!(timeline.pages.len(), 1);
        assert_eq!(timeline.events[0].duration, 0);
        assert_eq!(timeline.first_time, 250);
        assert_eq!(timeline.last_time, 250);
    }

    #[test]
    fn test_implicit_page_and_resolved_durations() {
        let timeline = aggregate(&[segment(
            vec![],
            vec![record(100), record(150), record(400)],
        )]);

        assert_eq!(timeline.pages.len(), 1);
        assert_eq!(timeline.pages[0].start_time, 100);
        assert_eq!(timeline.pages[0].end_time, 400);
        assert_eq!(timeline.pages[0].duration, 300);

        let durations: Vec<i64> = timeline.events.iter().map(|e| e.duration).collect();
        assert_eq!(durations, vec![50, 250, 0]);
        assert_eq!(timeline.duration, 300);
    }

    #[test]
    fn test_page_end_resolved_across_segments() {
        let first = segment(vec![marker(1000)], vec![record(1000)]);
        let mut second_rec = record(1200);
        second_rec.buffer_page_idx = 0;
        let second = segment(vec![marker(1200)], vec![second_rec]);

        let timeline = aggregate(&[first, second]);

        assert_eq!(timeline.pages.len(), 2);
        assert_eq!(timeline.pages[0].end_time, 1200);
        assert_eq!(timeline.pages[0].duration, 200);
        // cross-segment cursor resolves the prior record's duration
        assert_eq!(timeline.events[0].duration, 200);
        // the second segment's records land on the second page
        assert_eq!(timeline.events[1].page_idx, 1);
    }

    #[test]
    fn test_async_overlap_spliced_before_next_page_record() {
        let mut load = EventRecord::new(EventKind::Profiler, 0).with_event_type("load");
        load.buffer_page_idx = 0;
        let async_rec = record(500).with_duration(900);
        let mut nav = EventRecord::new(EventKind::Dom, 600).with_history();
        nav.buffer_page_idx = 1;

        let timeline = aggregate(&[segment(
            vec![marker(0), marker(600)],
            vec![load, async_rec, nav],
        )]);

        assert_eq!(timeline.events.len(), 4);
        let overlap = &timeline.events[2];
        assert!(overlap.is_page_overlap);
        assert_eq!(overlap.page_idx, 1);
        assert_eq!(overlap.record.time, 600);
        assert_eq!(overlap.duration, 800);
        assert_eq!(overlap.original_event_idx, Some(1));

        // the real record on the second page follows the overlap copy
        assert_eq!(timeline.events[3].record.time, 600);
        assert!(!timeline.events[3].is_page_overlap);
    }

    #[test]
    fn test_leftover_overlap_flushed_at_end() {
        // no real record ever lands on the second page
        let async_rec = record(500).with_duration(900);
        let timeline = aggregate(&[segment(
            vec![marker(0), marker(600)],
            vec![record(0), async_rec],
        )]);

        let overlap = timeline.events.last().unwrap();
        assert!(overlap.is_page_overlap);
        assert_eq!(overlap.record.time, 600);
        assert_eq!(overlap.duration, 800);
    }

    #[test]
    fn test_error_records_flag_their_page() {
        let timeline = aggregate(&[segment(
            vec![],
            vec![record(100), EventRecord::new(EventKind::Error, 150), record(200)],
        )]);

        assert!(timeline.pages[0].has_errors);
        assert_eq!(timeline.errors, vec![1]);
    }

    #[test]
    fn test_type_and_node_name_sets_sorted_and_normalized() {
        let timeline = aggregate(&[segment(
            vec![],
            vec![
                record(1).with_node("DIV", ELEMENT_NODE),
                EventRecord::new(EventKind::Xhr, 2).with_event_type("loadend"),
                record(3).with_node("BODY", ELEMENT_NODE),
                record(4).with_node("#text", 3),
            ],
        )]);

        let types: Vec<&String> = timeline.event_types.iter().collect();
        assert_eq!(types, vec!["dom.click", "xhr.loadend"]);

        let names: Vec<&String> = timeline.node_names.iter().collect();
        assert_eq!(names, vec!["body", "div"]);
    }

    #[test]
    fn test_memory_trend() {
        let sample = |used| MemorySample {
            js_heap_size_limit: 1_000,
            total_js_heap_size: 500,
            used_js_heap_size: used,
        };
        let timeline = aggregate(&[segment(
            vec![],
            vec![
                record(1).with_memory(sample(100)),
                record(2).with_memory(sample(300)),
                record(3).with_memory(sample(50)),
                record(4),
            ],
        )]);

        assert_eq!(timeline.events[0].memory_trend, None);
        assert_eq!(
            timeline.events[1].memory_trend,
            Some(MemoryTrend { is_up: true, is_down: false })
        );
        assert_eq!(
            timeline.events[2].memory_trend,
            Some(MemoryTrend { is_up: false, is_down: true })
        );
        // no sample on the last record, no trend
        assert_eq!(timeline.events[3].memory_trend, None);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let segments = vec![
            segment(vec![marker(0)], vec![record(0), record(100).with_duration(50)]),
            segment(vec![marker(400)], vec![record(400), record(450)]),
        ];

        let first = aggregate(&segments);
        let second = aggregate(&segments);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
