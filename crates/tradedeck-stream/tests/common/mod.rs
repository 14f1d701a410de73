/*
[INPUT]:  Test scenarios that need a transport without a network
[OUTPUT]: Scripted connector, server handles and payload fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for tradedeck-stream tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tradedeck_stream::{Connection, ConnectionState, Connector, Result, StreamConfig, StreamError};

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
    /// Never resolves; exercises the connect timeout.
    Hang,
}

#[derive(Debug)]
enum ServerEvent {
    Text(String),
    Drop,
}

/// Test-side end of one accepted connection.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ServerHandle {
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.tx.send(ServerEvent::Text(text.into()));
    }

    /// Simulate the peer dropping the connection.
    pub fn disconnect(&self) {
        let _ = self.tx.send(ServerEvent::Drop);
    }

    /// The client side has released the connection.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
struct Shared {
    outcomes: VecDeque<Outcome>,
    fallback: Outcome,
    urls: Vec<String>,
    attempted_at: Vec<Instant>,
    servers: Vec<ServerHandle>,
}

/// Connector whose behaviour is queued up front by the test.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedConnector {
    /// Once the queue is empty every further connect uses `fallback`.
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                outcomes: outcomes.into_iter().collect(),
                fallback,
                urls: Vec::new(),
                attempted_at: Vec::new(),
                servers: Vec::new(),
            })),
        }
    }

    pub fn accepting() -> Self {
        Self::new([], Outcome::Accept)
    }

    pub fn push(&self, outcome: Outcome) {
        self.shared.lock().unwrap().outcomes.push_back(outcome);
    }

    pub fn attempts(&self) -> usize {
        self.shared.lock().unwrap().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.shared.lock().unwrap().urls.clone()
    }

    /// Gaps between consecutive connect attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        let shared = self.shared.lock().unwrap();
        shared
            .attempted_at
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub fn server(&self, index: usize) -> ServerHandle {
        self.shared.lock().unwrap().servers[index].clone()
    }

    pub fn latest_server(&self) -> ServerHandle {
        self.shared
            .lock()
            .unwrap()
            .servers
            .last()
            .cloned()
            .expect("no connection accepted yet")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        let outcome = {
            let mut shared = self.shared.lock().unwrap();
            shared.urls.push(url.to_string());
            shared.attempted_at.push(Instant::now());
            let fallback = shared.fallback;
            shared.outcomes.pop_front().unwrap_or(fallback)
        };
        // A real handshake suspends; lets state watchers observe `Connecting`.
        tokio::task::yield_now().await;

        match outcome {
            Outcome::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.shared.lock().unwrap().servers.push(ServerHandle { tx });
                Ok(Box::new(ScriptedConnection { rx }))
            }
            Outcome::Refuse => Err(StreamError::Closed("connection refused".to_string())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn recv(&mut self) -> Option<Result<String>> {
        match self.rx.recv().await? {
            ServerEvent::Text(text) => Some(Ok(text)),
            ServerEvent::Drop => None,
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

pub fn test_config() -> StreamConfig {
    StreamConfig::default().with_base_url("wss://stream.test:9443")
}

/// Wait for the next state change and return it.
pub async fn next_state(rx: &mut watch::Receiver<ConnectionState>) -> ConnectionState {
    rx.changed().await.expect("state channel closed");
    *rx.borrow_and_update()
}

/// Wait until the state satisfies `predicate`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    predicate: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    let state = rx.wait_for(|state| predicate(state)).await.expect("state channel closed");
    *state
}

pub fn trade_payload(symbol: &str, price: &str, quantity: &str, buyer_is_maker: bool) -> String {
    serde_json::json!({
        "e": "trade",
        "E": 1_700_000_000_000_i64,
        "s": symbol,
        "t": 42,
        "p": price,
        "q": quantity,
        "T": 1_700_000_000_000_i64,
        "m": buyer_is_maker
    })
    .to_string()
}

pub fn enveloped(stream: &str, data: &str) -> String {
    format!(r#"{{"stream":"{stream}","data":{data}}}"#)
}
