//! Injected wall-clock abstraction.
//!
//! Every `now` and every periodic sleep in the engine goes through a
//! [`Clock`] so that tests can drive time manually. Production code uses
//! [`SystemClock`]; tests use [`MockClock`] and call
//! [`MockClock::advance`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

/// Source of the current time, with a sleep primitive for periodic tasks.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration, as measured by this clock.
    async fn sleep(&self, duration: Duration);
}

/// Real wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually advanced clock for tests.
///
/// `sleep` suspends until `advance` moves the clock past the deadline. A
/// task sleeping two minutes that is woken by a 25 minute advance observes
/// exactly one wake-up; its next deadline is measured from the new now.
/// After calling `advance`, give the runtime a moment (a short real sleep)
/// so woken tasks actually run before asserting on their effects.
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
    notify: Notify,
}

impl MockClock {
    /// A mock clock starting at a fixed, arbitrary instant.
    pub fn new() -> Self {
        // Deterministic start so timestamps in test failures are readable.
        Self::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    /// A mock clock starting at the given instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            notify: Notify::new(),
        }
    }

    /// Move the clock forward and wake every sleeper whose deadline passed.
    pub fn advance(&self, duration: Duration) {
        {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += clamped(duration);
        }
        self.notify.notify_waiters();
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + clamped(duration);
        loop {
            // Register interest before checking, otherwise an advance
            // between the check and the await would be lost.
            let notified = self.notify.notified();
            if self.now() >= deadline {
                return;
            }
            notified.await;
        }
    }
}

// Durations far beyond any realistic cache lifetime are capped so that
// date arithmetic cannot overflow.
fn clamped(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36500))
}
