//! Per-command throttle for expensive command families.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::RateLimited;

/// Throttled command families. Each family owns one independent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Player count rendering.
    Players,
}

impl std::fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandFamily::Players => write!(f, "players"),
        }
    }
}

/// Minimum spacing between two executions of the guarded path.
///
/// Only a successful acquire moves the window; rejected calls do not extend it.
#[derive(Debug)]
pub struct RateWindow {
    min_interval: Duration,
    last_served_at: Mutex<Option<Instant>>,
}

impl RateWindow {
    /// Window that admits one call per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_served_at: Mutex::new(None),
        }
    }

    /// Configured minimum interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Try to enter the window now.
    pub fn try_acquire(&self) -> Result<(), RateLimited> {
        self.try_acquire_at(Instant::now())
    }

    /// Try to enter the window at `now`.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), RateLimited> {
        let mut last = self.last_served_at.lock();
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_interval {
                return Err(RateLimited {
                    retry_after: self.min_interval - elapsed,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }
}
