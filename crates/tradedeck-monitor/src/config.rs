/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed and validated monitor configuration
[POS]:    Configuration layer - monitor setup
[UPDATE]: When adding new configuration options
*/

use std::path::PathBuf;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tradedeck_stream::StreamConfig;

/// Partial depth levels the exchange publishes.
pub const SUPPORTED_DEPTH_LEVELS: [u16; 3] = [5, 10, 20];

/// Top-level configuration for the market monitor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Trading symbol (e.g., "BTCUSDT")
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Order book levels to stream per side
    #[serde(default = "default_depth_levels")]
    pub depth_levels: u16,
    /// Trades kept in the tape, newest first
    #[serde(default = "default_trade_history")]
    pub trade_history: usize,
    /// Seconds between market summary log lines
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Optional log file; stdout logging stays on
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            depth_levels: default_depth_levels(),
            trade_history: default_trade_history(),
            report_interval_secs: default_report_interval_secs(),
            log_file: None,
            stream: StreamConfig::default(),
        }
    }
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_depth_levels() -> u16 {
    20
}

fn default_trade_history() -> usize {
    50
}

fn default_report_interval_secs() -> u64 {
    10
}

impl MonitorConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config file {path}"))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("symbol must not be empty");
        }
        if !SUPPORTED_DEPTH_LEVELS.contains(&self.depth_levels) {
            bail!(
                "depth_levels must be one of {:?}, got {}",
                SUPPORTED_DEPTH_LEVELS,
                self.depth_levels
            );
        }
        if self.trade_history == 0 {
            bail!("trade_history must be at least 1");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be at least 1");
        }
        if self.stream.connect_timeout_ms == 0 {
            bail!("stream.connect_timeout_ms must be at least 1");
        }
        Ok(())
    }
}
