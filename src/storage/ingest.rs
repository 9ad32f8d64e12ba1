//! Ingest service
//!
//! The reference `SessionBackend`: issues session tickets, decodes merged
//! deliveries, enriches the records with page boundaries, and persists the
//! result as one outer-compressed segment.

use crate::relay::{
    Compressor, DeliveryPayload, IngestEnvelope, SessionBackend, SessionRequest, SessionTicket,
};
use crate::storage::store::SegmentStore;
use crate::timeline::{PageMarker, SegmentRecording};
use crate::utils::errors::{EngineError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};
use ulid::Ulid;

/// Session issuance and delivery ingestion against a `SegmentStore`
pub struct IngestService {
    store: Arc<SegmentStore>,
    compressor: Compressor,
}

impl IngestService {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            compressor: Compressor::default(),
        }
    }

    fn profiler_id() -> String {
        let mut rng = rand::thread_rng();
        (0..16)
            .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
            .collect()
    }

    /// Walk the delivery's records in order, extracting page boundaries and
    /// stamping each record with the index of the page it belongs to within
    /// this segment. Records that precede the first boundary stay on page 0.
    fn enrich(envelope: &mut IngestEnvelope) -> Vec<PageMarker> {
        let mut pages = Vec::new();
        let mut buffer_event_idx = 0usize;

        for batch in &mut envelope.event_buffer {
            // deliveries merge batches; keep each batch internally ordered
            batch.records.sort_by_key(|r| r.time);

            for record in &mut batch.records {
                if record.opens_page() {
                    record.is_new_page = true;
                    pages.push(PageMarker {
                        buffer_event_idx,
                        url: record.url.clone(),
                        start_time: record.time,
                    });
                }
                record.buffer_page_idx = pages.len().saturating_sub(1);
                buffer_event_idx += 1;
            }
        }

        pages
    }

    async fn ingest_delivery(
        &self,
        ticket: &SessionTicket,
        delivery: DeliveryPayload,
    ) -> Result<()> {
        let session = self
            .store
            .session(&ticket.session_id)
            .await?
            .ok_or_else(|| {
                EngineError::Session(format!("unknown session {}", ticket.session_id))
            })?;
        if session.account_id != ticket.account_id || session.website_id != ticket.website_id {
            return Err(EngineError::Session(format!(
                "ticket does not match session {}",
                ticket.session_id
            )));
        }

        let mut envelope: IngestEnvelope = self.compressor.decompress_json(&delivery.body)?;
        let pages = Self::enrich(&mut envelope);
        let record_count: usize = envelope
            .event_buffer
            .iter()
            .map(|batch| batch.records.len())
            .sum();

        let recording = SegmentRecording {
            pages,
            event_buffer: envelope.event_buffer,
            duration: delivery.duration,
            has_error: delivery.error,
        };

        self.store
            .append_segment(&ticket.session_id, &recording, record_count)
            .await?;

        debug!(
            session_id = %ticket.session_id,
            records = record_count,
            pages = recording.pages.len(),
            "delivery ingested"
        );
        Ok(())
    }
}

impl SessionBackend for IngestService {
    fn create_session(&self, request: SessionRequest) -> BoxFuture<'_, Result<SessionTicket>> {
        async move {
            let ticket = SessionTicket {
                session_id: Ulid::new().to_string(),
                account_id: request.account_id.clone(),
                website_id: request.website_id.clone(),
                profiler_id: Self::profiler_id(),
            };

            self.store.create_session(&ticket, &request).await?;
            info!(session_id = %ticket.session_id, "session issued");
            Ok(ticket)
        }
        .boxed()
    }

    fn ingest<'a>(
        &'a self,
        ticket: &'a SessionTicket,
        delivery: DeliveryPayload,
    ) -> BoxFuture<'a, Result<()>> {
        self.ingest_delivery(ticket, delivery).boxed()
    }
}
