//! Compression relay
//!
//! Queues inner-compressed buffer snapshots and decides when to deliver
//! them: immediately for error sessions, at a queue threshold for normal
//! sessions, and on a background timer so nothing is held indefinitely. A
//! delivery merges every queued batch into one envelope and re-compresses
//! it; failed deliveries leave the queue untouched for the next timer tick.

use crate::capture::FlushSnapshot;
use crate::relay::compressor::Compressor;
use crate::relay::session::{DeliveryPayload, IngestEnvelope, SessionTicket};
use crate::utils::config::RelayConfig;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::debug;

/// One inner-compressed buffer snapshot queued for delivery
#[derive(Debug, Clone)]
pub struct CompressedBatch {
    pub error: bool,
    pub duration: i64,
    pub record_count: usize,
    pub bytes: Vec<u8>,
}

/// Session issuance state. At most one create-session call is outstanding;
/// deliveries queue behind `Pending` instead of duplicating the request.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    #[default]
    Unresolved,
    Pending,
    Ready(SessionTicket),
}

/// FIFO of compressed batches plus the delivery/session state machine
#[derive(Debug)]
pub struct CompressionRelay {
    queue: VecDeque<CompressedBatch>,
    queue_threshold: usize,
    compressor: Compressor,
    session: SessionState,

    /// Number of batches covered by the outstanding delivery, if any
    in_flight: Option<usize>,
}

impl CompressionRelay {
    pub fn new(config: &RelayConfig, compressor: Compressor) -> Self {
        Self {
            queue: VecDeque::new(),
            queue_threshold: config.queue_threshold,
            compressor,
            session: SessionState::Unresolved,
            in_flight: None,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_delivering(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// See if a create-session call should be started
    pub fn needs_session(&self) -> bool {
        matches!(self.session, SessionState::Unresolved) && !self.queue.is_empty()
    }

    pub fn mark_session_pending(&mut self) {
        self.session = SessionState::Pending;
    }

    pub fn resolve_session(&mut self, ticket: SessionTicket) {
        debug!(session_id = %ticket.session_id, "session resolved");
        self.session = SessionState::Ready(ticket);
    }

    /// Issuance failed; drop back to unresolved so the timer retries
    pub fn fail_session(&mut self) {
        self.session = SessionState::Unresolved;
    }

    /// Inner-compress one flush snapshot onto the queue.
    ///
    /// `duration` is the playable time the snapshot accounts for, accumulated
    /// by the pipeline from the buffer's inter-event deltas.
    pub fn enqueue(&mut self, snapshot: FlushSnapshot, duration: i64) -> Result<()> {
        if snapshot.is_empty() {
            return Ok(());
        }

        let batch = CompressedBatch {
            error: snapshot.has_error(),
            duration,
            record_count: snapshot.records.len(),
            bytes: self.compressor.compress_json(&snapshot)?,
        };

        debug!(
            records = batch.record_count,
            queued = self.queue.len() + 1,
            "batch queued"
        );
        self.queue.push_back(batch);
        Ok(())
    }

    /// See if the queue should be delivered now.
    ///
    /// `recording` is the flushed buffer's error-session flag: error sessions
    /// deliver every flush immediately for lower latency.
    pub fn wants_delivery(&self, recording: bool) -> bool {
        !self.queue.is_empty() && (recording || self.queue.len() >= self.queue_threshold)
    }

    /// Merge the queued batches into one delivery.
    ///
    /// Returns `None` when there is nothing to deliver, a delivery is already
    /// outstanding, or the session is not ready yet. The queue is left intact
    /// until `complete_delivery(true)`.
    pub fn begin_delivery(&mut self) -> Result<Option<(SessionTicket, DeliveryPayload)>> {
        if self.queue.is_empty() || self.in_flight.is_some() {
            return Ok(None);
        }
        let SessionState::Ready(ticket) = &self.session else {
            return Ok(None);
        };
        let ticket = ticket.clone();

        let mut envelope = IngestEnvelope::default();
        for batch in &self.queue {
            envelope.error |= batch.error;
            envelope.duration += batch.duration;
            envelope.event_buffer.push(
                self.compressor
                    .decompress_json::<FlushSnapshot>(&batch.bytes)
                    .map_err(|e| EngineError::Delivery(format!("batch decode: {}", e)))?,
            );
        }

        let body = Bytes::from(self.compressor.compress_json(&envelope)?);
        self.in_flight = Some(self.queue.len());

        debug!(
            batches = self.queue.len(),
            bytes = body.len(),
            "delivery started"
        );

        Ok(Some((
            ticket,
            DeliveryPayload {
                error: envelope.error,
                duration: envelope.duration,
                body,
            },
        )))
    }

    /// Record the outcome of the outstanding delivery. Success drains the
    /// delivered prefix; failure keeps every batch queued for retry.
    pub fn complete_delivery(&mut self, success: bool) {
        let Some(count) = self.in_flight.take() else {
            return;
        };
        if success {
            self.queue.drain(..count.min(self.queue.len()));
            debug!(remaining = self.queue.len(), "delivery acknowledged");
        } else {
            debug!(queued = self.queue.len(), "delivery failed, batches retained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::{EventKind, EventRecord};

    fn ticket() -> SessionTicket {
        SessionTicket {
            session_id: "sess".into(),
            account_id: "acct".into(),
            website_id: "site".into(),
            profiler_id: "prof".into(),
        }
    }

    fn snapshot(times: &[i64], with_error: bool) -> FlushSnapshot {
        let mut records: Vec<EventRecord> = times
            .iter()
            .map(|&t| EventRecord::new(EventKind::Dom, t))
            .collect();
        let mut errors = Vec::new();
        if with_error {
            let err = EventRecord::new(EventKind::Error, times[0]);
            errors.push(err.clone());
            records.push(err);
        }
        FlushSnapshot { errors, records }
    }

    fn relay() -> CompressionRelay {
        CompressionRelay::new(&RelayConfig::default(), Compressor::default())
    }

    #[test]
    fn test_delivery_triggers() {
        let mut relay = relay();
        assert!(!relay.wants_delivery(false));

        relay.enqueue(snapshot(&[1, 2], false), 1).unwrap();
        assert!(!relay.wants_delivery(false));
        // an error-session flush delivers immediately
        assert!(relay.wants_delivery(true));

        relay.enqueue(snapshot(&[3], false), 1).unwrap();
        relay.enqueue(snapshot(&[4], false), 1).unwrap();
        // threshold of 3 queued batches reached
        assert!(relay.wants_delivery(false));
    }

    #[test]
    fn test_empty_snapshot_not_queued() {
        let mut relay = relay();
        relay.enqueue(FlushSnapshot::default(), 0).unwrap();
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn test_no_delivery_without_session() {
        let mut relay = relay();
        relay.enqueue(snapshot(&[1], false), 10).unwrap();
        assert!(relay.begin_delivery().unwrap().is_none());
        assert!(relay.needs_session());
    }

    #[test]
    fn test_merge_or_sum_concat() {
        let mut relay = relay();
        relay.resolve_session(ticket());
        relay.enqueue(snapshot(&[1, 2], false), 10).unwrap();
        relay.enqueue(snapshot(&[3], true), 25).unwrap();

        let (_, payload) = relay.begin_delivery().unwrap().unwrap();
        assert!(payload.error);
        assert_eq!(payload.duration, 35);

        let envelope: IngestEnvelope = Compressor::default()
            .decompress_json(&payload.body)
            .unwrap();
        assert_eq!(envelope.event_buffer.len(), 2);
        assert_eq!(envelope.event_buffer[0].records.len(), 2);
        assert!(envelope.event_buffer[1].has_error());
    }

    #[test]
    fn test_failure_keeps_batches_queued() {
        let mut relay = relay();
        relay.resolve_session(ticket());
        relay.enqueue(snapshot(&[1], false), 5).unwrap();

        assert!(relay.begin_delivery().unwrap().is_some());
        relay.complete_delivery(false);
        assert_eq!(relay.queued(), 1);

        // the retry sees the same batch again
        let (_, payload) = relay.begin_delivery().unwrap().unwrap();
        assert_eq!(payload.duration, 5);
        relay.complete_delivery(true);
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn test_success_drains_only_delivered_prefix() {
        let mut relay = relay();
        relay.resolve_session(ticket());
        relay.enqueue(snapshot(&[1], false), 1).unwrap();
        relay.enqueue(snapshot(&[2], false), 2).unwrap();

        assert!(relay.begin_delivery().unwrap().is_some());
        // a batch arrives while the delivery is outstanding
        relay.enqueue(snapshot(&[3], false), 3).unwrap();
        relay.complete_delivery(true);

        assert_eq!(relay.queued(), 1);
        let (_, payload) = relay.begin_delivery().unwrap().unwrap();
        assert_eq!(payload.duration, 3);
    }

    #[test]
    fn test_single_outstanding_delivery() {
        let mut relay = relay();
        relay.resolve_session(ticket());
        relay.enqueue(snapshot(&[1], false), 1).unwrap();

        assert!(relay.begin_delivery().unwrap().is_some());
        assert!(relay.is_delivering());
        assert!(relay.begin_delivery().unwrap().is_none());
    }

    #[test]
    fn test_session_single_flight_transitions() {
        let mut relay = relay();
        relay.enqueue(snapshot(&[1], false), 1).unwrap();
        assert!(relay.needs_session());

        relay.mark_session_pending();
        assert!(!relay.needs_session());

        relay.fail_session();
        assert!(relay.needs_session());

        relay.mark_session_pending();
        relay.resolve_session(ticket());
        assert!(relay.begin_delivery().unwrap().is_some());
    }
}
