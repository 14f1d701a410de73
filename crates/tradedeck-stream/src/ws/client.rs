/*
[INPUT]:  Stream lists, per-stream callbacks, StreamConfig
[OUTPUT]: One multiplexed market-data session with reconnects and callback fan-out
[POS]:    WebSocket layer - public client facade
[UPDATE]: When changing session control operations or what callers can observe
*/

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ConnectionSession, ConnectionState, SessionContext, SessionWorker};
use super::message::StreamMessage;
use super::registry::SubscriptionRegistry;
use super::stats::{StreamStats, StreamStatsSnapshot};
use super::transport::{Connector, TungsteniteConnector};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::stream_id::StreamId;

#[derive(Debug)]
struct ActiveSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Client for the Binance public market-data streams.
///
/// One physical connection carries every stream of the current session.
/// Callbacks registered with [`subscribe`](Self::subscribe) outlive sessions
/// and reconnects; only [`unsubscribe`](Self::unsubscribe) and
/// [`close`](Self::close) remove them.
pub struct MarketStreamClient<C: Connector = TungsteniteConnector> {
    config: StreamConfig,
    connector: Arc<C>,
    ctx: SessionContext,
    session: RwLock<Option<ConnectionSession>>,
    active: Mutex<Option<ActiveSession>>,
    shutdown: CancellationToken,
}

impl MarketStreamClient<TungsteniteConnector> {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }
}

impl Default for MarketStreamClient<TungsteniteConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> MarketStreamClient<C> {
    pub fn with_connector(config: StreamConfig, connector: C) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            connector: Arc::new(connector),
            ctx: SessionContext {
                registry: Arc::new(SubscriptionRegistry::new()),
                stats: Arc::new(StreamStats::default()),
                state: Arc::new(state),
                reconnect_attempts: Arc::new(AtomicU32::new(0)),
            },
            session: RwLock::new(None),
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Open a session carrying `streams`. Resolves once the transport opens.
    ///
    /// No-op while another `connect` is still in flight. A session that is
    /// open or reconnecting is torn down first; subscriptions are kept.
    pub async fn connect<I>(&self, streams: I) -> Result<()>
    where
        I: IntoIterator<Item = StreamId>,
    {
        self.start(streams.into_iter().collect(), false).await
    }

    /// Replace the current session's stream list, cancelling any in-flight
    /// connect. Subscriptions are kept.
    pub async fn switch_streams<I>(&self, streams: I) -> Result<()>
    where
        I: IntoIterator<Item = StreamId>,
    {
        self.start(streams.into_iter().collect(), true).await
    }

    async fn start(&self, streams: Vec<StreamId>, replace_connecting: bool) -> Result<()> {
        let opened = {
            let mut active = self.active.lock().await;

            if !replace_connecting && self.state() == ConnectionState::Connecting {
                debug!("connect already in flight; ignoring");
                return Ok(());
            }

            let session = ConnectionSession::new(&self.config.base_url, streams)?;
            if let Some(previous) = active.take() {
                debug!("tearing down previous stream session");
                Self::stop(previous).await;
            }

            self.ctx.reconnect_attempts.store(0, Ordering::Relaxed);
            self.ctx.state.send_replace(ConnectionState::Connecting);
            *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());

            let cancel = self.shutdown.child_token();
            let (opened_tx, opened_rx) = oneshot::channel();
            let worker = SessionWorker::new(
                session,
                self.connector.clone(),
                self.config.clone(),
                self.ctx.clone(),
                cancel.clone(),
            );
            let handle = tokio::spawn(worker.run(opened_tx));
            *active = Some(ActiveSession { cancel, handle });

            opened_rx
        };

        opened.await.unwrap_or(Err(StreamError::Cancelled))
    }

    /// Tear down the session and drop every subscription. Idempotent.
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            Self::stop(previous).await;
            info!("stream client closed");
        }

        self.ctx.registry.clear();
        self.ctx.reconnect_attempts.store(0, Ordering::Relaxed);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.ctx.state.send_replace(ConnectionState::Closed);
    }

    async fn stop(session: ActiveSession) {
        session.cancel.cancel();
        if let Err(err) = session.handle.await {
            warn!(error = %err, "stream session worker ended abnormally");
        }
    }

    /// Register `callback` for `stream` (or [`StreamId::wildcard`]), replacing
    /// any previous one. Valid in every state.
    pub fn subscribe<F>(&self, stream: impl Into<StreamId>, callback: F)
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.ctx.registry.subscribe(stream.into(), callback);
    }

    pub fn unsubscribe(&self, stream: &str) -> bool {
        self.ctx.registry.unsubscribe(stream)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn state(&self) -> ConnectionState {
        *self.ctx.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Stream list of the current session, in `connect` order.
    pub fn session_streams(&self) -> Option<Arc<[StreamId]>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.streams.clone())
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.ctx.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    pub fn subscription_count(&self) -> usize {
        self.ctx.registry.len()
    }
}

impl<C: Connector> Drop for MarketStreamClient<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<C: Connector> std::fmt::Debug for MarketStreamClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStreamClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("registry", &self.ctx.registry)
            .finish()
    }
}
