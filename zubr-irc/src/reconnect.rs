//! Reconnect timing policy.
//!
//! The scheduler owns no socket state. The transport asks it for the next
//! [`ConnectionAttempt`] after every unexpected close and tells it when a
//! registration succeeds so the next disconnect episode starts at attempt 1.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for automatic reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Disable to turn every unexpected close into a final close.
    pub enabled: bool,
    /// Delay before the first reconnect attempt.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Attempts per disconnect episode before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 30,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a 1-based attempt number, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Wait duration and attempt counter for one retry. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub wait: Duration,
    /// 1-based within the current disconnect episode.
    pub attempt: u32,
}

/// Backoff state for one network.
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectScheduler {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempts: 0 }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Attempts made in the current episode.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Next retry, or `None` when reconnection is disabled or exhausted.
    pub fn next_attempt(&mut self) -> Option<ConnectionAttempt> {
        if !self.config.enabled || self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(ConnectionAttempt {
            wait: self.config.delay_for_attempt(self.attempts),
            attempt: self.attempts,
        })
    }

    /// Registration completed: the next episode starts over.
    pub fn registered(&mut self) {
        self.attempts = 0;
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
