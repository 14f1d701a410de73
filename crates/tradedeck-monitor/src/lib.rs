/*
[INPUT]:  Public API exports for tradedeck-monitor crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod market;

// Re-export main types for convenience
pub use config::MonitorConfig;
pub use market::{BookRow, FeedSet, LiveMarket, MarketMonitor, MarketSnapshot, TickerStats, TradeRow};
