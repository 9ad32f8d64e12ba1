//! Cancellable timer for self-rescheduling loops
//!
//! The flush timer, playback loop, and stream delivery loop all suspend
//! themselves with timers. Each loop owns exactly one `CancellableTimer`;
//! whoever holds the handle can cancel between steps, so restarts never leak
//! a pending timer.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A timer whose sleeps can be interrupted by its owner
#[derive(Debug, Clone, Default)]
pub struct CancellableTimer {
    token: CancellationToken,
}

impl CancellableTimer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the timer was cancelled before the duration
    /// elapsed, `true` otherwise.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Cancel the timer; all pending and future sleeps return immediately
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// See if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
