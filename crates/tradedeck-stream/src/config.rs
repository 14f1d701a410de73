/*
[INPUT]:  Defaults or a deserialized config section
[OUTPUT]: StreamConfig consumed by the client and its session workers
[POS]:    Configuration layer - endpoint, connect bound and reconnect pacing
[UPDATE]: When adding client-level tunables
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ws::BackoffConfig;

pub const DEFAULT_BASE_URL: &str = "wss://stream.binance.com:9443";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Endpoint without a path; `/ws/...` or `/stream?...` is appended per session
    pub base_url: String,
    pub connect_timeout_ms: u64,
    pub backoff: BackoffConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            backoff: BackoffConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
