//! Recording pipeline
//!
//! Capture → buffer → relay behave as one single-threaded, message-driven
//! task: a bounded ingress channel feeds the session buffer, flushes feed the
//! compression relay, and deliveries run as fire-and-forget subtasks that
//! report back on an internal channel, so capture is never blocked on the
//! backend. One background interval drives periodic delivery and retries.

use crate::capture::{CaptureContext, EventRecord, SessionBuffer};
use crate::relay::compressor::Compressor;
use crate::relay::relay::{CompressionRelay, SessionState};
use crate::relay::session::{SessionBackend, SessionRequest, SessionTicket};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pipeline counters
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub events_captured: u64,
    pub events_dropped: u64,
    pub batches_flushed: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub bytes_delivered: u64,
}

/// Messages accepted by the pipeline task
enum PipelineMsg {
    Record(Box<EventRecord>),
    Flush,
}

/// Results reported back by fire-and-forget subtasks
enum RelayEvent {
    SessionResolved(Result<SessionTicket>),
    DeliveryDone { success: bool, bytes: usize },
}

/// Handle to a running recording pipeline
pub struct RecordingPipeline {
    tx: mpsc::Sender<PipelineMsg>,
    stats: Arc<Mutex<PipelineStats>>,
    handle: JoinHandle<()>,
}

impl RecordingPipeline {
    /// Spawn the pipeline task for one browsing session
    pub fn start(
        config: EngineConfig,
        request: SessionRequest,
        backend: Arc<dyn SessionBackend>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer.ingress_capacity);
        let stats = Arc::new(Mutex::new(PipelineStats::default()));

        let task = PipelineTask {
            buffer: SessionBuffer::new(&config.buffer),
            context: CaptureContext::new(),
            relay: CompressionRelay::new(&config.relay, Compressor::default()),
            backend,
            request,
            stats: Arc::clone(&stats),
            pending_duration: 0,
        };

        let flush_interval = Duration::from_millis(config.relay.flush_interval_ms);
        let handle = tokio::spawn(task.run(rx, flush_interval));

        info!("recording pipeline started");
        Self { tx, stats, handle }
    }

    /// Submit a captured event. Never blocks; a full ingress channel drops
    /// the event with a logged capture error.
    pub fn record(&self, record: EventRecord) -> Result<()> {
        match self.tx.try_send(PipelineMsg::Record(Box::new(record))) {
            Ok(()) => {
                self.stats.lock().events_captured += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.lock().events_dropped += 1;
                warn!("capture ingress full, event dropped");
                Err(EngineError::Capture(format!("ingress rejected event: {}", e)))
            }
        }
    }

    /// Ask the pipeline to flush the buffer and attempt a delivery
    pub async fn flush(&self) -> Result<()> {
        self.tx
            .send(PipelineMsg::Flush)
            .await
            .map_err(|e| EngineError::Capture(format!("pipeline stopped: {}", e)))
    }

    /// Flush everything and stop the pipeline task
    pub async fn shutdown(self) -> Result<()> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| EngineError::Capture(format!("pipeline task panicked: {}", e)))
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }
}

/// State owned by the spawned pipeline task
struct PipelineTask {
    buffer: SessionBuffer,
    context: CaptureContext,
    relay: CompressionRelay,
    backend: Arc<dyn SessionBackend>,
    request: SessionRequest,
    stats: Arc<Mutex<PipelineStats>>,
    pending_duration: i64,
}

impl PipelineTask {
    async fn run(mut self, mut rx: mpsc::Receiver<PipelineMsg>, flush_interval: Duration) {
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let mut interval = tokio::time::interval(flush_interval);
        // the first tick fires immediately; skip it
        interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(PipelineMsg::Record(record)) => {
                        self.ingest_record(*record);
                        if self.buffer.should_flush() {
                            let recording = self.buffer.is_recording();
                            self.flush_buffer();
                            self.progress(&relay_tx, recording);
                        }
                    }
                    Some(PipelineMsg::Flush) => {
                        self.flush_buffer();
                        self.progress(&relay_tx, true);
                    }
                    None => break,
                },

                Some(event) = relay_rx.recv() => {
                    // a resolved session replays queued deliveries in order;
                    // failures wait for the next interval tick instead of
                    // retrying hot
                    if self.on_relay_event(event) {
                        self.progress(&relay_tx, true);
                    }
                }

                _ = interval.tick() => {
                    // periodic delivery/retry so data is never held forever
                    self.progress(&relay_tx, true);
                }
            }
        }

        self.drain(&mut relay_rx).await;
        info!("recording pipeline stopped");
    }

    fn ingest_record(&mut self, mut record: EventRecord) {
        self.context.prepare(&mut record);
        self.buffer.add(record);
        self.pending_duration += self.buffer.last_duration();
    }

    /// Snapshot the buffer into the relay queue
    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let snapshot = self.buffer.clear();
        let duration = std::mem::take(&mut self.pending_duration);
        match self.relay.enqueue(snapshot, duration) {
            Ok(()) => self.stats.lock().batches_flushed += 1,
            Err(e) => error!("batch flush failed: {}", e),
        }
    }

    /// Drive the relay forward: resolve the session if needed, then start a
    /// delivery subtask when the relay wants one.
    fn progress(&mut self, relay_tx: &mpsc::UnboundedSender<RelayEvent>, force: bool) {
        if self.relay.needs_session() {
            self.relay.mark_session_pending();
            let backend = Arc::clone(&self.backend);
            let request = self.request.clone();
            let tx = relay_tx.clone();
            tokio::spawn(async move {
                let result = backend.create_session(request).await;
                let _ = tx.send(RelayEvent::SessionResolved(result));
            });
            return;
        }

        if !(force || self.relay.wants_delivery(self.buffer.is_recording())) {
            return;
        }

        match self.relay.begin_delivery() {
            Ok(Some((ticket, payload))) => {
                let backend = Arc::clone(&self.backend);
                let tx = relay_tx.clone();
                let bytes = payload.body.len();
                tokio::spawn(async move {
                    let success = match backend.ingest(&ticket, payload).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("delivery failed, will retry: {}", e);
                            false
                        }
                    };
                    let _ = tx.send(RelayEvent::DeliveryDone { success, bytes });
                });
            }
            Ok(None) => {}
            Err(e) => error!("delivery preparation failed: {}", e),
        }
    }

    /// Apply a subtask result; returns true when the relay should be driven
    /// forward immediately
    fn on_relay_event(&mut self, event: RelayEvent) -> bool {
        match event {
            RelayEvent::SessionResolved(Ok(ticket)) => {
                self.relay.resolve_session(ticket);
                true
            }
            RelayEvent::SessionResolved(Err(e)) => {
                warn!("session issuance failed, will retry: {}", e);
                self.relay.fail_session();
                false
            }
            RelayEvent::DeliveryDone { success, bytes } => {
                self.relay.complete_delivery(success);
                let mut stats = self.stats.lock();
                if success {
                    stats.deliveries += 1;
                    stats.bytes_delivered += bytes as u64;
                } else {
                    stats.delivery_failures += 1;
                }
                success
            }
        }
    }

    /// Final best-effort flush and delivery on shutdown
    async fn drain(&mut self, relay_rx: &mut mpsc::UnboundedReceiver<RelayEvent>) {
        // settle in-flight subtasks; each outstanding one is guaranteed to
        // report exactly once
        while self.relay.is_delivering()
            || matches!(self.relay.session(), SessionState::Pending)
        {
            match relay_rx.recv().await {
                Some(event) => {
                    self.on_relay_event(event);
                }
                None => break,
            }
        }

        self.flush_buffer();

        if self.relay.needs_session() {
            self.relay.mark_session_pending();
            match self.backend.create_session(self.request.clone()).await {
                Ok(ticket) => self.relay.resolve_session(ticket),
                Err(e) => {
                    warn!("session issuance failed during drain: {}", e);
                    self.relay.fail_session();
                    return;
                }
            }
        }

        match self.relay.begin_delivery() {
            Ok(Some((ticket, payload))) => {
                let bytes = payload.body.len();
                match self.backend.ingest(&ticket, payload).await {
                    Ok(()) => {
                        self.relay.complete_delivery(true);
                        let mut stats = self.stats.lock();
                        stats.deliveries += 1;
                        stats.bytes_delivered += bytes as u64;
                        debug!("final delivery flushed");
                    }
                    Err(e) => {
                        self.relay.complete_delivery(false);
                        self.stats.lock().delivery_failures += 1;
                        warn!("final delivery failed: {}", e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!("final delivery preparation failed: {}", e),
        }
    }
}
