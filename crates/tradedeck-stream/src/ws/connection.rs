/*
[INPUT]:  Stream list, StreamConfig, a Connector and the shared registry/stats
[OUTPUT]: One session worker task: open, pump frames, reconnect with backoff
[POS]:    WebSocket layer - connection lifecycle state machine
[UPDATE]: When changing lifecycle transitions, timeouts or reconnect behaviour
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::backoff::{Backoff, ReconnectStep};
use super::message::StreamMessage;
use super::registry::SubscriptionRegistry;
use super::router::{self, Route};
use super::stats::StreamStats;
use super::transport::{Connection, Connector};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::stream_id::StreamId;

const MESSAGE_SAMPLE_LIMIT: usize = 3;
const UNROUTABLE_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    CoolingDown { delay: Duration },
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// A session exists and has not ended.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }
}

/// Identity of one `connect` call; reused verbatim by every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub id: Uuid,
    pub streams: Arc<[StreamId]>,
    pub url: Url,
}

impl ConnectionSession {
    pub fn new(base_url: &str, streams: Vec<StreamId>) -> Result<Self> {
        let url = build_session_url(base_url, &streams)?;
        Ok(Self {
            id: Uuid::new_v4(),
            streams: streams.into(),
            url,
        })
    }
}

/// `{base}/ws/{stream}` for one stream, `{base}/stream?streams=a/b` for several.
pub fn build_session_url(base_url: &str, streams: &[StreamId]) -> Result<Url> {
    let base = base_url.trim_end_matches('/');
    let raw = match streams {
        [] => return Err(StreamError::EmptyStreamList),
        [single] => format!("{base}/ws/{single}"),
        many => {
            let joined = many
                .iter()
                .map(StreamId::as_str)
                .collect::<Vec<_>>()
                .join("/");
            format!("{base}/stream?streams={joined}")
        }
    };
    Ok(Url::parse(&raw)?)
}

/// State shared between the client facade and its session workers.
#[derive(Debug, Clone)]
pub(crate) struct SessionContext {
    pub registry: Arc<SubscriptionRegistry>,
    pub stats: Arc<StreamStats>,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub reconnect_attempts: Arc<AtomicU32>,
}

#[derive(Debug)]
enum PumpExit {
    Cancelled,
    Disconnected(String),
}

pub(crate) struct SessionWorker<C: Connector> {
    session: ConnectionSession,
    connector: Arc<C>,
    config: StreamConfig,
    ctx: SessionContext,
    cancel: CancellationToken,
    backoff: Backoff,
    sampler: LogSampler,
}

impl<C: Connector> SessionWorker<C> {
    pub fn new(
        session: ConnectionSession,
        connector: Arc<C>,
        config: StreamConfig,
        ctx: SessionContext,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.backoff.clone());
        Self {
            session,
            connector,
            config,
            ctx,
            cancel,
            backoff,
            sampler: LogSampler::default(),
        }
    }

    /// Drive the session until it is cancelled or the first open fails.
    ///
    /// `opened` resolves once: `Ok` on the first open, the error otherwise.
    pub async fn run(mut self, opened: oneshot::Sender<Result<()>>) {
        let session_id = self.session.id;
        self.set_state(ConnectionState::Connecting);
        info!(
            %session_id,
            url = %self.session.url,
            streams = self.session.streams.len(),
            "stream session connecting"
        );

        let mut conn = match self.open_transport().await {
            Ok(conn) => conn,
            Err(StreamError::Cancelled) => {
                debug!(%session_id, "stream session cancelled while connecting");
                let _ = opened.send(Err(StreamError::Cancelled));
                return;
            }
            Err(err) => {
                warn!(%session_id, error = %err, "stream session failed to open");
                self.set_state(ConnectionState::Closed);
                let _ = opened.send(Err(err));
                return;
            }
        };

        self.mark_open();
        info!(%session_id, "stream session open");
        let _ = opened.send(Ok(()));

        loop {
            let exit = self.pump(conn.as_mut()).await;
            if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, conn.close()).await.is_err() {
                debug!(%session_id, "ws close handshake timed out");
            }

            let reason = match exit {
                PumpExit::Cancelled => {
                    debug!(%session_id, "stream session cancelled");
                    return;
                }
                PumpExit::Disconnected(reason) => reason,
            };
            warn!(%session_id, reason = %reason, "stream session disconnected; reconnecting");

            conn = match self.reconnect().await {
                Some(conn) => conn,
                None => return,
            };
        }
    }

    /// Retry with backoff until a transport opens. `None` when cancelled.
    async fn reconnect(&mut self) -> Option<Box<dyn Connection>> {
        let session_id = self.session.id;

        loop {
            let step = self.backoff.next_step();
            self.ctx
                .reconnect_attempts
                .store(self.backoff.attempts(), Ordering::Relaxed);

            match step {
                ReconnectStep::Retry { attempt, delay } => {
                    self.set_state(ConnectionState::Reconnecting { attempt, delay });
                    info!(%session_id, attempt, delay_ms = delay.as_millis() as u64, "stream reconnect scheduled");
                }
                ReconnectStep::Cooldown { delay } => {
                    self.set_state(ConnectionState::CoolingDown { delay });
                    warn!(
                        %session_id,
                        max_attempts = self.config.backoff.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "stream reconnect attempts exhausted; cooling down"
                    );
                }
            }

            if !self.sleep_or_cancel(step.delay()).await {
                return None;
            }
            if matches!(step, ReconnectStep::Cooldown { .. }) {
                continue;
            }

            self.set_state(ConnectionState::Connecting);
            match self.open_transport().await {
                Ok(conn) => {
                    self.mark_open();
                    self.ctx.stats.record_reconnect();
                    info!(%session_id, streams = self.session.streams.len(), "stream session reopened");
                    return Some(conn);
                }
                Err(StreamError::Cancelled) => return None,
                Err(err) => {
                    warn!(%session_id, attempt = self.backoff.attempts(), error = %err, "stream reconnect attempt failed");
                }
            }
        }
    }

    async fn open_transport(&self) -> Result<Box<dyn Connection>> {
        self.ctx.stats.record_connect_attempt();
        let bound = self.config.connect_timeout();
        let connect = self.connector.connect(self.session.url.as_str());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            outcome = tokio::time::timeout(bound, connect) => match outcome {
                Ok(result) => result,
                Err(_) => Err(StreamError::ConnectTimeout { after: bound }),
            },
        }
    }

    /// Returns false when cancelled before `delay` elapsed.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn pump(&mut self, conn: &mut dyn Connection) -> PumpExit {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                inbound = conn.recv() => match inbound {
                    Some(Ok(text)) => self.handle_text(&text),
                    Some(Err(err)) => return PumpExit::Disconnected(err.to_string()),
                    None => return PumpExit::Disconnected("closed by peer".to_string()),
                },
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        let stats = &self.ctx.stats;
        stats.record_received();

        match router::route_text(text) {
            Route::Routed(message) => {
                self.sampler.message(self.session.id, &message);
                let report = self.ctx.registry.dispatch(&message);
                stats.record_dispatched(report.failed);
            }
            Route::Unroutable(_) => {
                stats.record_unroutable();
                self.sampler.unroutable(self.session.id, text);
            }
            Route::Malformed(err) => {
                stats.record_malformed();
                self.sampler.parse_failed(self.session.id, &err, text);
            }
        }
    }

    fn mark_open(&mut self) {
        self.backoff.reset();
        self.ctx.reconnect_attempts.store(0, Ordering::Relaxed);
        self.set_state(ConnectionState::Open);
    }

    fn set_state(&self, state: ConnectionState) {
        self.ctx.state.send_replace(state);
    }
}

/// Bounded per-session log sampling of inbound traffic.
#[derive(Debug, Default)]
struct LogSampler {
    messages: usize,
    unroutable: usize,
    parse_failures: usize,
}

impl LogSampler {
    fn message(&mut self, session_id: Uuid, message: &StreamMessage) {
        if self.messages >= MESSAGE_SAMPLE_LIMIT {
            return;
        }
        self.messages += 1;
        info!(
            %session_id,
            sample_index = self.messages,
            sample_limit = MESSAGE_SAMPLE_LIMIT,
            stream = %message.stream,
            unknown = message.event.is_unknown(),
            "ws message sample"
        );
    }

    fn unroutable(&mut self, session_id: Uuid, raw: &str) {
        if self.unroutable >= UNROUTABLE_LOG_LIMIT {
            return;
        }
        self.unroutable += 1;
        info!(
            %session_id,
            sample_index = self.unroutable,
            sample_limit = UNROUTABLE_LOG_LIMIT,
            bytes = raw.len(),
            "ws frame unroutable; dropped"
        );
        debug!(
            %session_id,
            sample_index = self.unroutable,
            message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
            "ws frame unroutable; dropped"
        );
    }

    fn parse_failed(&mut self, session_id: Uuid, err: &serde_json::Error, raw: &str) {
        if self.parse_failures >= PARSE_FAIL_LOG_LIMIT {
            return;
        }
        self.parse_failures += 1;
        info!(
            %session_id,
            sample_index = self.parse_failures,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws frame parse failed; dropped"
        );
        debug!(
            %session_id,
            sample_index = self.parse_failures,
            message = %truncate_for_log(raw, RAW_LOG_MAX_BYTES),
            "ws frame parse failed; dropped"
        );
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
