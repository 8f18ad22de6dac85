//! Backoff bookkeeping for chat session reconnects.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ReconnectError;

/// Static reconnect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

/// Consecutive-failure counter and the delay it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectState {
    policy: BackoffPolicy,
    attempt: u32,
    delay: Duration,
}

impl ReconnectState {
    /// Fresh state for `policy`.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            delay: policy.initial_delay.min(policy.max_delay),
        }
    }

    /// Consecutive failures recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt: `initial * 2^attempt`, capped.
    pub fn next_delay(&self) -> Duration {
        self.delay
    }

    /// Count one failed attempt, doubling the delay.
    pub fn record_failure(&mut self) -> Result<Duration, ReconnectError> {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > self.policy.max_attempts {
            return Err(ReconnectError::Exhausted {
                attempts: self.policy.max_attempts,
            });
        }
        self.delay = delay_for(&self.policy, self.attempt);
        Ok(self.delay)
    }

    /// Back to initial values after a healthy session.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }
}

fn delay_for(policy: &BackoffPolicy, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| policy.initial_delay.checked_mul(factor))
        .map_or(policy.max_delay, |delay| delay.min(policy.max_delay))
}

/// Shared reconnect bookkeeping between the session runner and the gateway
/// ready handler.
pub struct ReconnectSupervisor {
    state: Mutex<ReconnectState>,
}

impl ReconnectSupervisor {
    /// Supervisor starting from a fresh state.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: Mutex::new(ReconnectState::new(policy)),
        }
    }

    /// The session is up again; forget previous failures.
    pub fn mark_healthy(&self) {
        let mut state = self.state.lock();
        if state.attempt() > 0 {
            info!("session healthy after {} failed attempts", state.attempt());
        }
        state.reset();
    }

    /// The session ended. Returns the delay to wait before reconnecting.
    ///
    /// The first loss after a healthy session waits the initial delay; every
    /// further consecutive loss doubles it until the attempt budget runs out.
    pub fn on_session_lost(&self) -> Result<Duration, ReconnectError> {
        let mut state = self.state.lock();
        let delay = state.next_delay();
        state.record_failure()?;
        warn!(
            "session lost, reconnect attempt {} in {:?}",
            state.attempt(),
            delay
        );
        Ok(delay)
    }

    /// Snapshot of the current bookkeeping.
    pub fn state(&self) -> ReconnectState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(3600),
            max_attempts,
        }
    }

    #[test]
    fn delay_doubles_per_failure() {
        let mut state = ReconnectState::new(policy(10));
        assert_eq!(state.next_delay(), Duration::from_secs(2));
        for k in 1..=5u32 {
            let delay = state.record_failure().unwrap();
            assert_eq!(delay, Duration::from_secs(2 * 2u64.pow(k)));
            assert_eq!(state.attempt(), k);
        }
    }

    #[test]
    fn delay_is_capped() {
        let mut state = ReconnectState::new(BackoffPolicy {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            max_attempts: 50,
        });
        for _ in 0..40 {
            assert!(state.record_failure().unwrap() <= Duration::from_secs(30));
        }
        assert_eq!(state.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn exhaustion_after_max_attempts() {
        let mut state = ReconnectState::new(policy(3));
        for _ in 0..3 {
            assert!(state.record_failure().is_ok());
        }
        assert_eq!(
            state.record_failure(),
            Err(ReconnectError::Exhausted { attempts: 3 })
        );
    }

    #[test]
    fn reset_restores_initial_values() {
        let mut state = ReconnectState::new(policy(5));
        state.record_failure().unwrap();
        state.record_failure().unwrap();
        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn supervisor_waits_initial_then_doubles() {
        let supervisor = ReconnectSupervisor::new(policy(3));
        assert_eq!(supervisor.on_session_lost().unwrap(), Duration::from_secs(2));
        assert_eq!(supervisor.on_session_lost().unwrap(), Duration::from_secs(4));
        assert_eq!(supervisor.on_session_lost().unwrap(), Duration::from_secs(8));
        assert!(matches!(
            supervisor.on_session_lost(),
            Err(ReconnectError::Exhausted { attempts: 3 })
        ));
    }

    #[test]
    fn healthy_session_resets_budget() {
        let supervisor = ReconnectSupervisor::new(policy(2));
        supervisor.on_session_lost().unwrap();
        supervisor.on_session_lost().unwrap();
        supervisor.mark_healthy();
        assert_eq!(supervisor.state().attempt(), 0);
        assert_eq!(supervisor.on_session_lost().unwrap(), Duration::from_secs(2));
    }
}
