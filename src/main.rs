//! Session Replay Engine
//!
//! Demo binary: records a short synthetic browsing session through the full
//! pipeline, then reconstructs, replays, and streams it back.

use anyhow::Result;
use session_replay_engine::capture::event::{EventKind, EventRecord};
use session_replay_engine::observability::init_tracing;
use session_replay_engine::playback::{PlaybackScheduler, StrategyRegistry};
use session_replay_engine::relay::{RecordingPipeline, SessionRequest};
use session_replay_engine::storage::{IngestService, SegmentStore};
use session_replay_engine::stream::StreamDeliveryLoop;
use session_replay_engine::timeline::aggregate;
use session_replay_engine::utils::config::EngineConfig;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("starting session replay engine v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load()?;
    info!("configuration loaded: {:?}", config);

    let store = Arc::new(SegmentStore::new(&config.storage).await?);
    let backend = Arc::new(IngestService::new(store.clone()));

    // record a synthetic browsing session
    let request = SessionRequest {
        account_id: "demo-account".into(),
        website_id: "demo-site".into(),
        origin_url: Some("https://example.com".into()),
        user_agent: Some("replay-engine-demo".into()),
    };
    let pipeline = RecordingPipeline::start(config.clone(), request, backend);

    let base = chrono::Utc::now().timestamp_millis();
    pipeline.record(
        EventRecord::new(EventKind::Profiler, base)
            .with_event_type("load")
            .with_url("https://example.com/"),
    )?;
    for i in 1..=12 {
        pipeline.record(
            EventRecord::new(EventKind::Dom, base + i * 40)
                .with_event_type("click")
                .with_node("BUTTON", 1),
        )?;
    }
    pipeline.record(
        EventRecord::new(EventKind::Xhr, base + 300)
            .with_event_type("loadend")
            .with_duration(450),
    )?;
    pipeline.record(
        EventRecord::new(EventKind::Dom, base + 600)
            .with_history()
            .with_url("https://example.com/next"),
    )?;

    pipeline.flush().await?;
    let stats = pipeline.stats();
    pipeline.shutdown().await?;
    info!(
        captured = stats.events_captured,
        flushed = stats.batches_flushed,
        "recording finished"
    );

    // reconstruct the timeline from storage
    let session = store
        .sessions()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no session was persisted"))?;
    info!(
        session_id = %session.session_id,
        segments = session.segment_count,
        duration_ms = session.duration,
        "session persisted"
    );

    let recordings = store.load_recordings(&session.session_id).await?;
    let timeline = aggregate(&recordings);
    info!(
        pages = timeline.pages.len(),
        events = timeline.events.len(),
        duration_ms = timeline.duration,
        types = ?timeline.event_types,
        "timeline reconstructed"
    );

    // replay it in real time with no-op effects
    let scheduler = PlaybackScheduler::new(timeline.events, StrategyRegistry::new());
    scheduler.play()?.await?;
    info!(replayed = scheduler.index(), "playback finished");

    // stream the stored segments back the way a viewer would receive them
    let stream = StreamDeliveryLoop::new(&config.stream, store.clone(), &session.session_id);
    let canceller = stream.canceller();
    let (mut rx, handle) = stream.spawn();
    let mut streamed = 0usize;
    while streamed < session.segment_count as usize {
        match rx.recv().await {
            Some(bytes) => {
                streamed += 1;
                info!(segment = streamed, bytes = bytes.len(), "segment streamed");
            }
            None => break,
        }
    }
    canceller.cancel();
    handle.await?;

    info!("demo complete");
    Ok(())
}
