/*
[INPUT]:  Scripted stream sessions feeding the market monitor
[OUTPUT]: Live view and symbol-switch behavior verification
[POS]:    Integration tests - market monitor
[UPDATE]: When the view derivation or switch flow changes
*/

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio_test::assert_ok;
use tradedeck_monitor::{MarketMonitor, MarketSnapshot, MonitorConfig};
use tradedeck_stream::{
    Connection, Connector, MarketStreamClient, Result, Side, StreamConfig,
};

/// Accepts every connect and hands the test a sender per session.
#[derive(Clone, Default)]
struct FeedConnector {
    sessions: Arc<Mutex<Vec<(String, mpsc::UnboundedSender<String>)>>>,
}

impl FeedConnector {
    fn urls(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    fn send(&self, text: String) {
        let sessions = self.sessions.lock().unwrap();
        let (_, tx) = sessions.last().expect("no session opened");
        tx.send(text).unwrap();
    }
}

#[async_trait]
impl Connector for FeedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push((url.to_string(), tx));
        Ok(Box::new(FeedConnection { rx }))
    }
}

struct FeedConnection {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Connection for FeedConnection {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

fn monitor(connector: FeedConnector) -> MarketMonitor<FeedConnector> {
    let config = MonitorConfig {
        trade_history: 2,
        stream: StreamConfig::default().with_base_url("wss://stream.test:9443"),
        ..MonitorConfig::default()
    };
    let client = MarketStreamClient::with_connector(config.stream.clone(), connector);
    MarketMonitor::with_client(&config, client)
}

fn envelope(stream: &str, data: serde_json::Value) -> String {
    serde_json::json!({"stream": stream, "data": data}).to_string()
}

fn trade(symbol: &str, id: u64, price: &str, buyer_is_maker: bool) -> serde_json::Value {
    serde_json::json!({
        "e": "trade", "E": 1, "s": symbol, "t": id,
        "p": price, "q": "0.1", "T": 1_700_000_000_000_i64, "m": buyer_is_maker
    })
}

async fn wait_until(
    rx: &mut watch::Receiver<MarketSnapshot>,
    predicate: impl Fn(&MarketSnapshot) -> bool,
) -> MarketSnapshot {
    rx.wait_for(|snapshot| predicate(snapshot))
        .await
        .expect("snapshot channel closed")
        .clone()
}

fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_live_view_follows_streams() {
    let connector = FeedConnector::default();
    let monitor = monitor(connector.clone());
    let mut snapshots = monitor.subscribe_snapshot();

    assert_ok!(monitor.start().await);
    assert_eq!(
        connector.urls(),
        vec!["wss://stream.test:9443/stream?streams=btcusdt@ticker/btcusdt@trade/btcusdt@depth20"]
    );
    wait_until(&mut snapshots, |s| s.connected).await;

    connector.send(envelope(
        "btcusdt@ticker",
        serde_json::json!({
            "e": "24hrTicker", "E": 1, "s": "BTCUSDT",
            "p": "500", "P": "1.2", "c": "42000.5", "o": "41500.5",
            "h": "42500", "l": "41000", "v": "1234.5", "q": "51000000"
        }),
    ));
    connector.send(envelope("btcusdt@trade", trade("BTCUSDT", 1, "42000", false)));
    connector.send(envelope("btcusdt@trade", trade("BTCUSDT", 2, "42001", true)));
    connector.send(envelope("btcusdt@trade", trade("BTCUSDT", 3, "42002", false)));
    connector.send(envelope(
        "btcusdt@depth20",
        serde_json::json!({
            "lastUpdateId": 9,
            "bids": [["42000", "1"], ["41999", "2"]],
            "asks": [["42001", "0.5"], ["42002", "0.5"]]
        }),
    ));

    let snapshot = wait_until(&mut snapshots, |s| !s.asks.is_empty()).await;

    let ticker = snapshot.ticker.as_ref().unwrap();
    assert_eq!(ticker.last_price, dec("42000.5"));
    assert_eq!(ticker.change_percent, dec("1.2"));

    let ids: Vec<Option<u64>> = snapshot.trades.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![Some(3), Some(2)]);
    assert_eq!(snapshot.trades[1].side, Side::Sell);

    assert_eq!(snapshot.bids[1].total, dec("3"));
    assert_eq!(snapshot.asks[1].total, dec("1"));
    assert_eq!(snapshot.spread(), Some(dec("1")));

    monitor.shutdown().await;
    assert!(!monitor.snapshot().connected);
}

#[tokio::test(start_paused = true)]
async fn test_switch_symbol_rebuilds_session_and_view() {
    let connector = FeedConnector::default();
    let monitor = monitor(connector.clone());
    let mut snapshots = monitor.subscribe_snapshot();
    assert_ok!(monitor.start().await);

    connector.send(envelope("btcusdt@trade", trade("BTCUSDT", 1, "42000", false)));
    wait_until(&mut snapshots, |s| !s.trades.is_empty()).await;

    assert_ok!(monitor.switch_symbol("ethusdt").await);

    assert_eq!(monitor.symbol().await, "ETHUSDT");
    assert_eq!(
        connector.urls()[1],
        "wss://stream.test:9443/stream?streams=ethusdt@ticker/ethusdt@trade/ethusdt@depth20"
    );
    assert_eq!(monitor.client().subscription_count(), 3);
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.symbol, "ETHUSDT");
    assert!(snapshot.trades.is_empty());

    connector.send(envelope("ethusdt@trade", trade("ETHUSDT", 7, "3000", false)));
    let snapshot = wait_until(&mut snapshots, |s| !s.trades.is_empty()).await;
    assert_eq!(snapshot.trades[0].price, dec("3000"));

    // Switching to the current symbol is a no-op.
    assert_ok!(monitor.switch_symbol("ETHUSDT").await);
    assert_eq!(connector.urls().len(), 2);

    monitor.shutdown().await;
}
