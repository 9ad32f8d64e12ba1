//! Stream delivery loop
//!
//! Feeds a viewer's channel with stored segment bytes, staying roughly one
//! look-ahead window ahead of real-time playback instead of pushing the
//! whole session at once. The outer compression frames concatenate, so the
//! receiver can decode the channel as one continuous stream.

use crate::storage::store::SegmentStore;
use crate::utils::config::StreamConfig;
use crate::utils::errors::Result;
use crate::utils::timer::CancellableTimer;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One stored segment as the stream sees it
#[derive(Debug, Clone)]
pub struct StoredSegment {
    /// Outer-compressed segment bytes, sent to the viewer as-is
    pub bytes: Bytes,

    /// Playable milliseconds the segment accounts for
    pub duration: i64,

    /// Records inside the segment
    pub record_count: usize,
}

/// Where the stream pulls segments from, by monotonic index
pub trait SegmentSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        session_id: &'a str,
        index: usize,
    ) -> BoxFuture<'a, Result<Option<StoredSegment>>>;
}

impl SegmentSource for SegmentStore {
    fn fetch<'a>(
        &'a self,
        session_id: &'a str,
        index: usize,
    ) -> BoxFuture<'a, Result<Option<StoredSegment>>> {
        async move {
            Ok(self.segment_at(session_id, index).await?.map(|row| {
                StoredSegment {
                    bytes: Bytes::from(row.bytes),
                    duration: row.duration,
                    record_count: row.record_count.max(0) as usize,
                }
            }))
        }
        .boxed()
    }
}

/// Look-ahead paced segment stream for one session
pub struct StreamDeliveryLoop {
    session_id: String,
    source: Arc<dyn SegmentSource>,
    lookahead_ms: i64,
    channel_capacity: usize,
    timer: CancellableTimer,
}

impl StreamDeliveryLoop {
    pub fn new(
        config: &StreamConfig,
        source: Arc<dyn SegmentSource>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            lookahead_ms: config.lookahead_ms as i64,
            channel_capacity: config.channel_capacity,
            timer: CancellableTimer::default(),
        }
    }

    /// Handle that stops the loop from outside
    pub fn canceller(&self) -> CancellableTimer {
        self.timer.clone()
    }

    /// Spawn the loop. It runs until cancelled or the receiver is dropped;
    /// reaching the live head only pauses it, more segments may still land.
    pub fn spawn(self) -> (mpsc::Receiver<Bytes>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<Bytes>) {
        // buffered playable time the viewer holds, estimated in milliseconds
        let mut buffered: i64 = 0;
        let mut index = 0usize;
        let half = Duration::from_millis((self.lookahead_ms / 2).max(1) as u64);
        let half_ms = half.as_millis() as i64;

        debug!(session_id = %self.session_id, "stream started");

        loop {
            if self.timer.is_cancelled() {
                break;
            }

            // ahead of the window: let playback catch up at half-window cadence
            if buffered >= self.lookahead_ms {
                if !self.pause(&tx, half).await {
                    break;
                }
                buffered -= half_ms;
                continue;
            }

            let started = Instant::now();
            match self.source.fetch(&self.session_id, index).await {
                Ok(Some(segment)) => {
                    let elapsed = started.elapsed().as_millis() as i64;
                    buffered = (buffered - elapsed).max(0) + segment.duration;

                    if tx.send(segment.bytes).await.is_err() {
                        debug!(session_id = %self.session_id, "viewer gone, stream stopped");
                        return;
                    }
                    index += 1;
                }
                Ok(None) => {
                    // caught up with the live head; the viewer keeps playing
                    if !self.pause(&tx, half).await {
                        break;
                    }
                    buffered = (buffered - half_ms).max(0);
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, index, error = %e, "segment fetch failed");
                    if !self.pause(&tx, half).await {
                        break;
                    }
                }
            }
        }

        debug!(session_id = %self.session_id, delivered = index, "stream stopped");
    }

    /// Sleep between fetches, waking early on cancellation or when the
    /// viewer's receiver is dropped. Returns `false` when the loop should
    /// stop.
    async fn pause(&self, tx: &mpsc::Sender<Bytes>, duration: Duration) -> bool {
        tokio::select! {
            done = self.timer.sleep(duration) => done,
            _ = tx.closed() => {
                debug!(session_id = %self.session_id, "viewer gone, stream stopped");
                false
            }
        }
    }
}
