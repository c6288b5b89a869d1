//! The idle timer that ends a capture session.
//!
//! [`IdleTimer`] is a plain deadline rather than a spawned task: the engine
//! awaits [`IdleTimer::expired`] inside its `select!` loop, so a fire is just
//! another event on the serialized control loop. Restarting replaces the
//! deadline, which means a fire scheduled before a capture can never flush
//! that capture early.

use std::future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Default idle window in seconds.
pub const DEFAULT_IDLE_SECS: u64 = 20;

/// Restartable single-shot countdown.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancels any pending fire and, if the session has files, schedules a new
    /// one a full window from now.
    pub fn restart(&mut self, has_files: bool) {
        self.deadline = has_files.then(|| Instant::now() + self.window);
        trace!(armed = self.deadline.is_some(), "Idle timer restarted");
    }

    /// Stops any pending fire.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the current deadline passes. Pends forever when unarmed.
    ///
    /// Does not disarm the timer; the caller cancels it once it has acted.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_IDLE_SECS))
    }
}
