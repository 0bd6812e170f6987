use crate::config::IntervalConfig;
use std::time::Duration;

/// Capped exponential backoff for the push channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

const MIN_INITIAL: Duration = Duration::from_millis(50);
const MAX_MULTIPLIER: f64 = 10.0;

impl From<&IntervalConfig> for ReconnectPolicy {
    fn from(intervals: &IntervalConfig) -> Self {
        let initial = Duration::from_millis(intervals.reconnect_initial_ms).max(MIN_INITIAL);
        let multiplier = if intervals.reconnect_multiplier.is_finite() {
            intervals.reconnect_multiplier.clamp(1.0, MAX_MULTIPLIER)
        } else {
            MAX_MULTIPLIER
        };
        Self {
            initial,
            max: Duration::from_millis(intervals.reconnect_max_ms).max(initial),
            multiplier,
        }
    }
}

/// Running state of one stream's reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            next: policy.initial.min(policy.max),
            policy,
        }
    }

    /// Delay before the next attempt; grows until `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.policy.max.min(delay.mul_f64(self.policy.multiplier));
        delay
    }

    /// Called after a connection succeeds.
    pub fn reset(&mut self) {
        self.next = self.policy.initial.min(self.policy.max);
    }

    /// The server's SSE `retry:` field replaces the initial delay.
    pub fn set_initial(&mut self, initial: Duration) {
        self.policy.initial = initial.max(MIN_INITIAL);
        self.reset();
    }
}
