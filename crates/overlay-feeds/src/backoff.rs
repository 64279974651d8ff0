//! Exponential retry gate with jitter.
//!
//! Each feed keeps one of these so an unreachable source is polled less and
//! less often instead of on every refresh tick.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    next_attempt_at: Instant,
    failures: u32,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            current: base,
            next_attempt_at: Instant::now(),
            failures: 0,
            jitter_ratio: 0.2,
        }
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn ready(&self) -> bool {
        Instant::now() >= self.next_attempt_at
    }

    /// Time left before the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.next_attempt_at.saturating_duration_since(Instant::now())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn succeed(&mut self) {
        if self.failures > 0 {
            tracing::debug!("Source recovered after {} failures", self.failures);
        }
        self.failures = 0;
        self.current = self.base;
        self.next_attempt_at = Instant::now();
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn fail(&mut self) -> Duration {
        if self.failures > 0 {
            self.current = self.current.saturating_mul(2).min(self.max);
        }
        self.failures = self.failures.saturating_add(1);
        let delay = add_jitter(self.current, self.jitter_ratio);
        self.next_attempt_at = Instant::now() + delay;
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    let jitter_max_ms = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_max_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=jitter_max_ms))
}
