//! Playback scheduler
//!
//! Replays a reconstructed timeline in real time: apply the current event's
//! effect, sleep the gap to the next one, repeat. A self-rescheduling timer
//! drives the loop so stop/restart never leaves a sleep behind.

use crate::playback::strategy::StrategyRegistry;
use crate::timeline::TimelineEvent;
use crate::utils::errors::{EngineError, Result};
use crate::utils::timer::CancellableTimer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fewest events a timeline should hold before starting a live replay;
/// shorter timelines risk draining before the next segment streams in
pub const MIN_SAFE_BUFFER_LEN: usize = 5;

#[derive(Debug, Default)]
struct SchedulerState {
    index: usize,
    playing: bool,

    /// Bumped by `stop()`; a superseded run may not touch its successor's
    /// state
    generation: u64,
}

/// Real-time replay of one timeline's events
pub struct PlaybackScheduler {
    events: Arc<Vec<TimelineEvent>>,
    effects: Arc<StrategyRegistry>,
    state: Arc<Mutex<SchedulerState>>,

    /// Replaced on stop/restart so a cancelled run cannot eat the next one's
    /// sleeps
    timer: Mutex<CancellableTimer>,
}

impl PlaybackScheduler {
    pub fn new(events: Vec<TimelineEvent>, effects: StrategyRegistry) -> Self {
        Self {
            events: Arc::new(events),
            effects: Arc::new(effects),
            state: Arc::new(Mutex::new(SchedulerState::default())),
            timer: Mutex::new(CancellableTimer::new()),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Position of the next event to replay
    pub fn index(&self) -> usize {
        self.state.lock().index
    }

    /// See if the timeline is long enough to survive live streaming gaps
    pub fn is_safe_buffer_len(&self) -> bool {
        self.events.len() > MIN_SAFE_BUFFER_LEN
    }

    /// Start (or resume) replay from the current position.
    ///
    /// Refused while a run is active. The returned handle resolves when the
    /// run finishes or is stopped.
    pub fn play(&self) -> Result<JoinHandle<()>> {
        let generation = {
            let mut state = self.state.lock();
            if state.playing {
                return Err(EngineError::Playback("already playing".to_string()));
            }
            if state.index >= self.events.len() {
                return Err(EngineError::Playback("nothing left to play".to_string()));
            }
            state.playing = true;
            state.generation
        };

        let events = self.events.clone();
        let effects = self.effects.clone();
        let state = self.state.clone();
        let timer = self.timer.lock().clone();

        debug!(events = events.len(), from = self.index(), "playback started");

        Ok(tokio::spawn(async move {
            loop {
                let idx = {
                    let mut state = state.lock();
                    if state.generation != generation {
                        break;
                    }
                    if !state.playing || state.index >= events.len() {
                        state.playing = false;
                        break;
                    }
                    let idx = state.index;
                    state.index += 1;
                    idx
                };

                let event = &events[idx];
                let effect = effects.effect_for(event.record.kind);

                // a failed effect is logged and the next event plays with no
                // added delay
                let delay = match effect.apply(event).await {
                    Ok(()) => events
                        .get(idx + 1)
                        .map(|next| (next.record.time - event.record.time).unsigned_abs())
                        .unwrap_or(0),
                    Err(e) => {
                        warn!(event_idx = idx, error = %e, "replay effect failed");
                        0
                    }
                };

                if delay > 0 && !timer.sleep(Duration::from_millis(delay)).await {
                    let mut state = state.lock();
                    if state.generation == generation {
                        state.playing = false;
                    }
                    break;
                }
            }
            debug!("playback stopped");
        }))
    }

    /// Stop the active run, keeping the position
    pub fn stop(&self) {
        let mut timer = self.timer.lock();
        timer.cancel();
        *timer = CancellableTimer::new();

        let mut state = self.state.lock();
        state.generation += 1;
        state.playing = false;
    }

    /// Stop and rewind to the first event
    pub fn restart(&self) {
        self.stop();
        self.state.lock().index = 0;
    }
}
