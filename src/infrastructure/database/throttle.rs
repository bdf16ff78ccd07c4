use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Gate that lets at most one log entry through per interval.
#[derive(Debug)]
pub struct RateLimitedLog {
    interval: Duration,
    last_emitted: Mutex<Option<Instant>>,
}

impl RateLimitedLog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emitted: Mutex::new(None),
        }
    }

    /// Returns true, and records `now`, when the previous entry is older than
    /// the interval.
    pub fn allow(&self, now: Instant) -> bool {
        let mut last = self.last_emitted.lock().unwrap_or_else(|p| p.into_inner());
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn last_emitted(&self) -> Option<Instant> {
        *self.last_emitted.lock().unwrap_or_else(|p| p.into_inner())
    }
}
