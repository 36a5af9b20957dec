//! Idle timer for a session, raced against every read, with an optional
//! hard limit that resets never extend.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, error::Elapsed, timeout_at};

#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
    limit: Option<Instant>,
}

impl Watchdog {
    /// A stopped watchdog. A zero `timeout` never fires.
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            limit: None,
        }
    }

    /// Never let a guarded read run past `limit`, however often the watchdog
    /// is reset.
    #[must_use]
    pub const fn with_limit(mut self, limit: Instant) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The earlier of the idle deadline and the hard limit.
    pub fn expiry(&self) -> Option<Instant> {
        match (self.deadline, self.limit) {
            (Some(deadline), Some(limit)) => Some(deadline.min(limit)),
            (deadline, limit) => deadline.or(limit),
        }
    }

    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the watchdog, or push its deadline back if already armed.
    pub fn reset(&mut self) {
        if !self.timeout.is_zero() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
    }

    pub const fn stop(&mut self) {
        self.deadline = None;
        self.limit = None;
    }

    /// Drive `future` to completion unless the expiry passes first.
    ///
    /// # Errors
    ///
    /// Returns [`Elapsed`] if the watchdog fired before `future` completed.
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, Elapsed> {
        match self.expiry() {
            Some(deadline) => timeout_at(deadline, future).await,
            None => Ok(future.await),
        }
    }
}
