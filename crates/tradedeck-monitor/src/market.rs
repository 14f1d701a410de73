/*
[INPUT]:  Ticker, trade and partial-depth messages for one symbol
[OUTPUT]: Latest MarketSnapshot via `watch` + symbol switching
[POS]:    Data layer - live market view fed by the stream client
[UPDATE]: When changing which feeds drive the view or how it is derived
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tradedeck_stream::{
    BookSnapshot, Connector, MarketEvent, MarketStreamClient, Result, Side, StreamId,
    StreamMessage, TickerEvent, TradeEvent, TungsteniteConnector,
};

use crate::config::MonitorConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerStats {
    pub last_price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRow {
    pub id: Option<u64>,
    pub price: Decimal,
    pub size: Decimal,
    pub time: Option<DateTime<Utc>>,
    pub side: Side,
}

/// One book level with the running size total from the top of its side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRow {
    pub price: Decimal,
    pub size: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub connected: bool,
    pub ticker: Option<TickerStats>,
    /// Newest first
    pub trades: Vec<TradeRow>,
    pub bids: Vec<BookRow>,
    pub asks: Vec<BookRow>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MarketSnapshot {
    pub fn last_price(&self) -> Option<Decimal> {
        self.ticker
            .as_ref()
            .map(|ticker| ticker.last_price)
            .or_else(|| self.trades.first().map(|trade| trade.price))
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|row| row.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|row| row.price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }
}

/// Market view state for a single symbol.
#[derive(Debug, Clone)]
pub struct LiveMarket {
    snapshot: MarketSnapshot,
    trade_history: usize,
}

impl LiveMarket {
    pub fn new(symbol: &str, trade_history: usize) -> Self {
        Self {
            snapshot: MarketSnapshot {
                symbol: symbol.to_uppercase(),
                ..MarketSnapshot::default()
            },
            trade_history: trade_history.max(1),
        }
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    /// Drop everything and start over for `symbol`. The connection flag is kept.
    pub fn reset(&mut self, symbol: &str) {
        let connected = self.snapshot.connected;
        *self = Self::new(symbol, self.trade_history);
        self.snapshot.connected = connected;
    }

    pub fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.snapshot.connected != connected;
        self.snapshot.connected = connected;
        changed
    }

    /// Fold one message into the view. Returns whether anything changed.
    ///
    /// Messages for any other symbol are ignored; a callback of the previous
    /// session may still be running right after a switch.
    pub fn apply(&mut self, message: &StreamMessage) -> bool {
        if !self.tracks(&message.stream) {
            debug!(stream = %message.stream, symbol = %self.snapshot.symbol, "stale market message ignored");
            return false;
        }

        let changed = match &message.event {
            MarketEvent::Ticker(ticker) => {
                self.apply_ticker(ticker);
                true
            }
            MarketEvent::Trade(trade) => {
                self.apply_trade(trade);
                true
            }
            MarketEvent::BookSnapshot(book) => {
                self.apply_book(book);
                true
            }
            _ => false,
        };

        if changed {
            self.snapshot.updated_at = Some(Utc::now());
        }
        changed
    }

    fn tracks(&self, stream: &StreamId) -> bool {
        stream
            .symbol()
            .is_some_and(|symbol| symbol.eq_ignore_ascii_case(&self.snapshot.symbol))
    }

    fn apply_ticker(&mut self, ticker: &TickerEvent) {
        self.snapshot.ticker = Some(TickerStats {
            last_price: ticker.last_price,
            change: ticker.price_change,
            change_percent: ticker.price_change_percent,
            high: ticker.high_price,
            low: ticker.low_price,
            volume: ticker.volume,
        });
    }

    fn apply_trade(&mut self, trade: &TradeEvent) {
        let row = TradeRow {
            id: trade.trade_id,
            price: trade.price,
            size: trade.quantity,
            time: trade.traded_at(),
            side: trade.side(),
        };

        let trades = &mut self.snapshot.trades;
        trades.insert(0, row);
        trades.truncate(self.trade_history);
    }

    fn apply_book(&mut self, book: &BookSnapshot) {
        self.snapshot.bids = cumulative_rows(book.bids.iter().map(|l| (l.price(), l.quantity())));
        self.snapshot.asks = cumulative_rows(book.asks.iter().map(|l| (l.price(), l.quantity())));
    }
}

fn cumulative_rows(levels: impl Iterator<Item = (Decimal, Decimal)>) -> Vec<BookRow> {
    let mut total = Decimal::ZERO;
    levels
        .map(|(price, size)| {
            total += size;
            BookRow { price, size, total }
        })
        .collect()
}

/// Streams a symbol's view needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSet {
    pub symbol: String,
    pub ticker: StreamId,
    pub trade: StreamId,
    pub depth: StreamId,
}

impl FeedSet {
    pub fn for_symbol(symbol: &str, depth_levels: u16) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            ticker: StreamId::ticker(symbol),
            trade: StreamId::trade(symbol),
            depth: StreamId::depth(symbol, depth_levels),
        }
    }

    pub fn streams(&self) -> Vec<StreamId> {
        vec![self.ticker.clone(), self.trade.clone(), self.depth.clone()]
    }
}

#[derive(Debug)]
struct SharedView {
    market: Mutex<LiveMarket>,
    snapshot_tx: watch::Sender<MarketSnapshot>,
}

impl SharedView {
    fn update(&self, apply: impl FnOnce(&mut LiveMarket) -> bool) {
        let mut market = self.market.lock().unwrap_or_else(PoisonError::into_inner);
        if apply(&mut market) {
            self.snapshot_tx.send_replace(market.snapshot().clone());
        }
    }
}

/// Live market view for one symbol at a time, fed by a [`MarketStreamClient`].
pub struct MarketMonitor<C: Connector = TungsteniteConnector> {
    client: Arc<MarketStreamClient<C>>,
    view: Arc<SharedView>,
    feeds: tokio::sync::Mutex<FeedSet>,
    depth_levels: u16,
    watcher_started: AtomicBool,
    shutdown: CancellationToken,
}

impl MarketMonitor<TungsteniteConnector> {
    pub fn from_config(config: &MonitorConfig) -> Self {
        let client = MarketStreamClient::with_config(config.stream.clone());
        Self::with_client(config, client)
    }
}

impl<C: Connector> MarketMonitor<C> {
    pub fn with_client(config: &MonitorConfig, client: MarketStreamClient<C>) -> Self {
        let market = LiveMarket::new(&config.symbol, config.trade_history);
        let (snapshot_tx, _rx) = watch::channel(market.snapshot().clone());

        Self {
            client: Arc::new(client),
            view: Arc::new(SharedView {
                market: Mutex::new(market),
                snapshot_tx,
            }),
            feeds: tokio::sync::Mutex::new(FeedSet::for_symbol(
                &config.symbol,
                config.depth_levels,
            )),
            depth_levels: config.depth_levels,
            watcher_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn client(&self) -> &MarketStreamClient<C> {
        &self.client
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<MarketSnapshot> {
        self.view.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        self.view.snapshot_tx.borrow().clone()
    }

    pub async fn symbol(&self) -> String {
        self.feeds.lock().await.symbol.clone()
    }

    /// Register the view's callbacks and open the session.
    pub async fn start(&self) -> Result<()> {
        self.spawn_connection_watcher();

        let streams = {
            let feeds = self.feeds.lock().await;
            self.register(&feeds);
            info!(symbol = %feeds.symbol, streams = feeds.streams().len(), "market monitor starting");
            feeds.streams()
        };
        self.client.connect(streams).await
    }

    /// Move the view to `symbol`: drop the old callbacks, reset the view and
    /// rebuild the session with the new symbol's streams.
    pub async fn switch_symbol(&self, symbol: &str) -> Result<()> {
        let mut feeds = self.feeds.lock().await;
        let next = FeedSet::for_symbol(symbol, self.depth_levels);
        if next == *feeds {
            debug!(symbol = %next.symbol, "symbol unchanged; switch skipped");
            return Ok(());
        }

        for stream in feeds.streams() {
            self.client.unsubscribe(stream.as_str());
        }
        self.view.update(|market| {
            market.reset(&next.symbol);
            true
        });
        self.register(&next);

        info!(from = %feeds.symbol, to = %next.symbol, "switching market symbol");
        let streams = next.streams();
        *feeds = next;
        self.client.switch_streams(streams).await
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.client.close().await;
        self.view.update(|market| market.set_connected(false));
    }

    fn register(&self, feeds: &FeedSet) {
        for stream in feeds.streams() {
            let view = self.view.clone();
            self.client.subscribe(stream, move |message: &StreamMessage| {
                view.update(|market| market.apply(message));
            });
        }
    }

    /// At most one watcher per monitor. Returns whether this call spawned it.
    fn spawn_connection_watcher(&self) -> bool {
        if self.watcher_started.swap(true, Ordering::AcqRel) {
            return false;
        }

        let mut state_rx = self.client.watch_state();
        let view = self.view.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let connected = state_rx.borrow_and_update().is_open();
                view.update(|market| market.set_connected(connected));

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        true
    }
}

impl<C: Connector> Drop for MarketMonitor<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradedeck_stream::{PriceLevel, TradeEvent};

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn trade_message(id: u64, price: &str, buyer_is_maker: bool) -> StreamMessage {
        StreamMessage {
            stream: StreamId::trade("btcusdt"),
            event: MarketEvent::Trade(TradeEvent {
                event_time: None,
                symbol: "BTCUSDT".to_string(),
                trade_id: Some(id),
                price: dec(price),
                quantity: dec("0.5"),
                trade_time: 1_700_000_000_000,
                buyer_is_maker,
            }),
        }
    }

    #[test]
    fn test_trade_tape_is_newest_first_and_capped() {
        let mut market = LiveMarket::new("btcusdt", 3);
        for id in 1..=5 {
            market.apply(&trade_message(id, "100", id % 2 == 0));
        }

        let ids: Vec<Option<u64>> = market.snapshot().trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(5), Some(4), Some(3)]);
        assert_eq!(market.snapshot().trades[0].side, Side::Buy);
        assert_eq!(market.snapshot().trades[1].side, Side::Sell);
        assert_eq!(market.snapshot().symbol, "BTCUSDT");
    }

    #[test]
    fn test_book_totals_accumulate_per_side() {
        let mut market = LiveMarket::new("btcusdt", 50);
        let message = StreamMessage {
            stream: StreamId::depth("btcusdt", 20),
            event: MarketEvent::BookSnapshot(BookSnapshot {
                last_update_id: 1,
                bids: vec![
                    PriceLevel(dec("100"), dec("1.5")),
                    PriceLevel(dec("99"), dec("2")),
                ],
                asks: vec![
                    PriceLevel(dec("101"), dec("0.25")),
                    PriceLevel(dec("102"), dec("1")),
                    PriceLevel(dec("103"), dec("3")),
                ],
            }),
        };

        assert!(market.apply(&message));

        let snapshot = market.snapshot();
        let bid_totals: Vec<Decimal> = snapshot.bids.iter().map(|row| row.total).collect();
        let ask_totals: Vec<Decimal> = snapshot.asks.iter().map(|row| row.total).collect();
        assert_eq!(bid_totals, vec![dec("1.5"), dec("3.5")]);
        assert_eq!(ask_totals, vec![dec("0.25"), dec("1.25"), dec("4.25")]);
        assert_eq!(snapshot.spread(), Some(dec("1")));
    }

    #[test]
    fn test_unrelated_events_leave_view_untouched() {
        let mut market = LiveMarket::new("btcusdt", 50);
        let message = StreamMessage {
            stream: StreamId::new("btcusdt@markPrice"),
            event: MarketEvent::Unknown(serde_json::json!({"e": "markPriceUpdate"})),
        };

        assert!(!market.apply(&message));
        assert!(market.snapshot().updated_at.is_none());
    }

    #[test]
    fn test_messages_for_previous_symbol_are_ignored() {
        let mut market = LiveMarket::new("btcusdt", 50);
        market.reset("ethusdt");

        assert!(!market.apply(&trade_message(1, "42000", false)));
        assert!(market.snapshot().trades.is_empty());
        assert!(market.snapshot().updated_at.is_none());
    }

    #[test]
    fn test_reset_keeps_connection_flag() {
        let mut market = LiveMarket::new("btcusdt", 50);
        market.set_connected(true);
        market.apply(&trade_message(1, "100", false));

        market.reset("ethusdt");

        assert_eq!(market.snapshot().symbol, "ETHUSDT");
        assert!(market.snapshot().trades.is_empty());
        assert!(market.snapshot().connected);
    }

    #[tokio::test]
    async fn test_connection_watcher_spawned_once() {
        let monitor = MarketMonitor::from_config(&MonitorConfig::default());

        assert!(monitor.spawn_connection_watcher());
        assert!(!monitor.spawn_connection_watcher());

        monitor.shutdown().await;
    }

    #[test]
    fn test_feed_set_order() {
        let feeds = FeedSet::for_symbol("BTCUSDT", 20);
        assert_eq!(
            feeds.streams(),
            vec![
                StreamId::new("btcusdt@ticker"),
                StreamId::new("btcusdt@trade"),
                StreamId::new("btcusdt@depth20"),
            ]
        );
    }
}
