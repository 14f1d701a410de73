/*
[INPUT]:  Decoded JSON payloads from the market stream endpoint
[OUTPUT]: MarketEvent tagged union (ticker, trade, depth, kline, unknown)
[POS]:    Data layer - one-shot classification of frame payloads
[UPDATE]: When adding feed kinds or when payload field names change
*/

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::Side;
use crate::stream_id::FeedKind;

pub const TRADE_EVENT: &str = "trade";
pub const AGG_TRADE_EVENT: &str = "aggTrade";
pub const KLINE_EVENT: &str = "kline";
pub const TICKER_EVENT: &str = "24hrTicker";
pub const DEPTH_UPDATE_EVENT: &str = "depthUpdate";

/// One price level `[price, quantity]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel(
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn quantity(&self) -> Decimal {
        self.1
    }
}

/// Rolling 24h ticker (`<symbol>@ticker`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price_change: Decimal,
    #[serde(rename = "P", with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub last_price: Decimal,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high_price: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low_price: Decimal,
    /// Base asset volume
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    /// Quote asset volume
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quote_volume: Decimal,
    #[serde(rename = "n", default)]
    pub trade_count: u64,
}

/// Single trade (`<symbol>@trade`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "t", default)]
    pub trade_id: Option<u64>,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl TradeEvent {
    pub fn side(&self) -> Side {
        Side::from_buyer_is_maker(self.buyer_is_maker)
    }

    pub fn traded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.trade_time)
    }
}

/// Aggregated trade (`<symbol>@aggTrade`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTradeEvent {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "a", default)]
    pub agg_trade_id: Option<u64>,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl AggTradeEvent {
    pub fn side(&self) -> Side {
        Side::from_buyer_is_maker(self.buyer_is_maker)
    }
}

/// Incremental book update (`<symbol>@depth`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdateEvent {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// Partial book snapshot (`<symbol>@depth<levels>`)
///
/// Carries no symbol; only routable through the combined-stream envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Candlestick update (`<symbol>@kline_<interval>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlineBar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineBar {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(rename = "n", default)]
    pub trade_count: u64,
    /// Whether the bar is final
    #[serde(rename = "x", default)]
    pub closed: bool,
}

/// A frame payload classified into exactly one feed variant.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Ticker(TickerEvent),
    Trade(TradeEvent),
    AggTrade(AggTradeEvent),
    DepthUpdate(DepthUpdateEvent),
    BookSnapshot(BookSnapshot),
    Kline(KlineEvent),
    /// Valid JSON that matched no known shape.
    Unknown(Value),
}

impl MarketEvent {
    /// Classify a payload.
    ///
    /// The embedded `e` marker decides the variant when present; otherwise the feed
    /// kind of the stream the frame arrived on is used. A payload that does not fit
    /// the chosen variant becomes `Unknown`.
    pub fn decode(payload: &Value, hint: Option<FeedKind>) -> Self {
        let marker_kind = payload
            .get("e")
            .and_then(Value::as_str)
            .and_then(feed_kind_for_marker);

        let Some(kind) = marker_kind.or(hint) else {
            return Self::Unknown(payload.clone());
        };

        let decoded = match kind {
            FeedKind::Ticker => TickerEvent::deserialize(payload).map(Self::Ticker),
            FeedKind::Trade => TradeEvent::deserialize(payload).map(Self::Trade),
            FeedKind::AggTrade => AggTradeEvent::deserialize(payload).map(Self::AggTrade),
            FeedKind::Kline => KlineEvent::deserialize(payload).map(Self::Kline),
            FeedKind::Depth => BookSnapshot::deserialize(payload).map(Self::BookSnapshot),
            FeedKind::DiffDepth => DepthUpdateEvent::deserialize(payload).map(Self::DepthUpdate),
        };

        decoded.unwrap_or_else(|_| Self::Unknown(payload.clone()))
    }

    /// Exchange symbol carried by the payload, if any.
    pub fn symbol(&self) -> Option<&str> {
        let symbol = match self {
            Self::Ticker(event) => &event.symbol,
            Self::Trade(event) => &event.symbol,
            Self::AggTrade(event) => &event.symbol,
            Self::DepthUpdate(event) => &event.symbol,
            Self::Kline(event) => &event.symbol,
            Self::BookSnapshot(_) | Self::Unknown(_) => return None,
        };
        (!symbol.is_empty()).then_some(symbol.as_str())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// Feed kind named by a payload's `e` marker.
pub(crate) fn feed_kind_for_marker(marker: &str) -> Option<FeedKind> {
    match marker {
        TRADE_EVENT => Some(FeedKind::Trade),
        AGG_TRADE_EVENT => Some(FeedKind::AggTrade),
        KLINE_EVENT => Some(FeedKind::Kline),
        TICKER_EVENT => Some(FeedKind::Ticker),
        DEPTH_UPDATE_EVENT => Some(FeedKind::DiffDepth),
        _ => None,
    }
}
