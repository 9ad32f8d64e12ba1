//! Replay effect strategies
//!
//! Replaying a timeline means re-applying each record's visible effect (DOM
//! patch, console line, network marker). The scheduler only times events;
//! what an event *does* on replay is a strategy registered per capture kind.

use crate::capture::EventKind;
use crate::timeline::TimelineEvent;
use crate::utils::errors::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Replays one event's visible effect
pub trait PlaybackEffect: Send + Sync {
    fn apply<'a>(&'a self, event: &'a TimelineEvent) -> BoxFuture<'a, Result<()>>;
}

/// Default effect for kinds without a registered strategy
struct NoopEffect;

impl PlaybackEffect for NoopEffect {
    fn apply<'a>(&'a self, event: &'a TimelineEvent) -> BoxFuture<'a, Result<()>> {
        async move {
            trace!(kind = event.record.kind.as_str(), time = event.record.time, "no-op replay");
            Ok(())
        }
        .boxed()
    }
}

static NOOP: Lazy<Arc<dyn PlaybackEffect>> = Lazy::new(|| Arc::new(NoopEffect));

/// Per-kind effect lookup with a no-op fallback
#[derive(Default)]
pub struct StrategyRegistry {
    effects: HashMap<EventKind, Arc<dyn PlaybackEffect>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EventKind, effect: Arc<dyn PlaybackEffect>) {
        self.effects.insert(kind, effect);
    }

    /// Effect for a kind; unknown kinds replay as a timed no-op
    pub fn effect_for(&self, kind: EventKind) -> Arc<dyn PlaybackEffect> {
        self.effects.get(&kind).cloned().unwrap_or_else(|| NOOP.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::EventRecord;

    struct Marker;

    impl PlaybackEffect for Marker {
        fn apply<'a>(&'a self, _event: &'a TimelineEvent) -> BoxFuture<'a, Result<()>> {
            async { Ok(()) }.boxed()
        }
    }

    fn event() -> TimelineEvent {
        TimelineEvent {
            record: EventRecord::new(EventKind::Console, 0),
            page_idx: 0,
            event_idx: 0,
            duration: 0,
            memory_trend: None,
            is_page_overlap: false,
            original_event_idx: None,
            overflows_page: false,
        }
    }

    #[tokio::test]
    async fn test_unregistered_kind_falls_back_to_noop() {
        let registry = StrategyRegistry::new();
        let effect = registry.effect_for(EventKind::Console);
        assert!(effect.apply(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_registered_effect_wins() {
        let mut registry = StrategyRegistry::new();
        registry.register(EventKind::Console, Arc::new(Marker));
        let effect = registry.effect_for(EventKind::Console);
        assert!(effect.apply(&event()).await.is_ok());
    }
}
