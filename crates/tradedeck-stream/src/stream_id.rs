/*
[INPUT]:  Trading symbol (any case) and feed parameters
[OUTPUT]: Canonical lowercase StreamId tokens
[POS]:    Naming layer - stream identifiers shared by router, registry and URLs
[UPDATE]: When adding new feed kinds or changing stream templates
*/

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default kline interval
pub const DEFAULT_KLINE_INTERVAL: &str = "1m";

/// Default number of levels for partial depth streams
pub const DEFAULT_DEPTH_LEVELS: u16 = 20;

/// Feed family encoded in the part of a stream name after `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Ticker,
    Trade,
    AggTrade,
    Kline,
    /// Partial book snapshots (`@depth5`, `@depth20`, ...)
    Depth,
    /// Incremental book updates (`@depth`)
    DiffDepth,
}

/// Identifier of one logical feed on the stream endpoint, e.g. `btcusdt@depth20`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Registration key that receives every dispatched frame.
    pub const WILDCARD: &'static str = "*";

    /// Wrap a raw stream name verbatim.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_string())
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{symbol}@ticker`
    pub fn ticker(symbol: &str) -> Self {
        Self(format!("{}@ticker", symbol.to_lowercase()))
    }

    /// `{symbol}@trade`
    pub fn trade(symbol: &str) -> Self {
        Self(format!("{}@trade", symbol.to_lowercase()))
    }

    /// `{symbol}@aggTrade`
    pub fn agg_trade(symbol: &str) -> Self {
        Self(format!("{}@aggTrade", symbol.to_lowercase()))
    }

    /// `{symbol}@kline_{interval}`
    pub fn kline(symbol: &str, interval: &str) -> Self {
        Self(format!("{}@kline_{}", symbol.to_lowercase(), interval))
    }

    /// `{symbol}@depth{levels}` (partial book snapshots)
    pub fn depth(symbol: &str, levels: u16) -> Self {
        Self(format!("{}@depth{}", symbol.to_lowercase(), levels))
    }

    /// `{symbol}@depth` (incremental book updates)
    pub fn diff_depth(symbol: &str) -> Self {
        Self(format!("{}@depth", symbol.to_lowercase()))
    }

    /// Symbol part of the id, if it has one.
    pub fn symbol(&self) -> Option<&str> {
        self.0.split_once('@').map(|(symbol, _)| symbol)
    }

    /// Feed family of the id. Update-speed suffixes such as `@100ms` are ignored.
    pub fn kind(&self) -> Option<FeedKind> {
        let (_, rest) = self.0.split_once('@')?;
        let feed = rest.split('@').next().unwrap_or(rest);

        match feed {
            "ticker" => Some(FeedKind::Ticker),
            "trade" => Some(FeedKind::Trade),
            "aggTrade" => Some(FeedKind::AggTrade),
            "depth" => Some(FeedKind::DiffDepth),
            _ if feed.starts_with("kline_") => Some(FeedKind::Kline),
            _ => {
                let levels = feed.strip_prefix("depth")?;
                if !levels.is_empty() && levels.bytes().all(|b| b.is_ascii_digit()) {
                    Some(FeedKind::Depth)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for StreamId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
