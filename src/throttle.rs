//! Rate limiting for outbound catalog queries.

use std::thread;
use std::time::{Duration, Instant};

/// Serializes catalog queries to at most one per interval.
///
/// After each wait the checkpoint moves to `now + interval`, so the time the
/// catalog call itself takes counts toward the next caller's wait. Taking
/// `&mut self` keeps the checkpoint single-writer.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: None,
        }
    }

    /// Limiter allowing `requests_per_minute` calls per minute. Zero disables throttling.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / requests_per_minute
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next call is allowed.
    pub fn remaining(&self) -> Duration {
        self.next_allowed
            .map(|next| next.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Block until the next call is allowed, then set the checkpoint.
    pub fn throttle(&mut self) {
        let wait = self.remaining();
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "throttling catalog request");
            thread::sleep(wait);
        }
        self.next_allowed = Some(Instant::now() + self.interval);
    }
}
