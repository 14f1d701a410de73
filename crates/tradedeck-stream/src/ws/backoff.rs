/*
[INPUT]:  BackoffConfig (base delay, attempt cap, cool-down)
[OUTPUT]: The next reconnect step: a numbered retry or a cool-down pause
[POS]:    WebSocket layer - reconnect pacing for the connection worker
[UPDATE]: When changing the retry schedule or cool-down semantics
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
    pub cooldown_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl BackoffConfig {
    /// `base * 2^(attempt-1)`, saturating.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    Retry { attempt: u32, delay: Duration },
    /// Attempt cap reached; wait, then the schedule restarts at attempt 1.
    Cooldown { delay: Duration },
}

impl ReconnectStep {
    pub fn delay(&self) -> Duration {
        match self {
            Self::Retry { delay, .. } | Self::Cooldown { delay } => *delay,
        }
    }
}

/// Reconnect attempt counter for one session.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called after a disconnect or a failed reconnect attempt.
    pub fn next_step(&mut self) -> ReconnectStep {
        let cap = self.config.max_attempts.max(1);
        if self.attempts >= cap {
            self.attempts = 0;
            return ReconnectStep::Cooldown {
                delay: self.config.cooldown(),
            };
        }

        self.attempts += 1;
        ReconnectStep::Retry {
            attempt: self.attempts,
            delay: self.config.delay_for(self.attempts),
        }
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
