//! # Push Channel
//!
//! Persistent WebSocket to the device with subscribe-on-open and automatic
//! reconnection.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Push Connection States                             │
//! │                                                                         │
//! │  ┌────────────┐    start()     ┌────────────┐                          │
//! │  │    Idle    │ ─────────────► │ Connecting │ ◄──────────────┐         │
//! │  └────────────┘                └─────┬──────┘                │         │
//! │        ▲                    success  │  failure / timeout    │         │
//! │        │                       ┌─────┴──────┐                │         │
//! │        │                       ▼            ▼                │         │
//! │        │                ┌────────────┐ ┌────────────┐        │         │
//! │        │                │    Open    │►│   Closed   │────────┘         │
//! │        │                └────────────┘ └────────────┘  reconnect       │
//! │        │                 send {"event": topic}          delay          │
//! │        │                 exactly once                                  │
//! │        │                                                               │
//! │        └──────────── stop() from any state (no reconnect)              │
//! │                                                                         │
//! │  RECONNECT DELAY                                                       │
//! │  ───────────────                                                       │
//! │  fixed (default):  5000ms, 5000ms, 5000ms, ...                         │
//! │  exponential:      5s, 10s, 20s, ... capped, reset after an open       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Inbound Messages
//! - Not JSON: logged, dropped, connection stays open.
//! - Topic matches: decoded into a snapshot and forwarded.
//! - Other topic: ignored, except that a `heap_memory` section is still
//!   forwarded on its own so distress is noticed whichever stream carries it.

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use microbox_core::Snapshot;

use crate::channel::{ChannelStatus, Delivery, Source};
use crate::collaborators::Diagnostics;
use crate::config::{LinkConfig, ReconnectGrowth};
use crate::error::{LinkError, LinkResult};
use crate::protocol::{Envelope, SubscribeMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Push Configuration
// =============================================================================

/// Configuration for the push channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket URL to connect to.
    pub url: Url,

    /// Topic sent in the subscribe message and matched on inbound messages.
    pub topic: String,

    /// Delay between a close and the next connect attempt.
    pub reconnect_delay: Duration,

    pub growth: ReconnectGrowth,

    /// Cap for exponential growth.
    pub max_reconnect_delay: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Keepalive ping interval. `None` disables pings.
    pub ping_interval: Option<Duration>,
}

impl PushConfig {
    pub fn from_link_config(config: &LinkConfig) -> LinkResult<Self> {
        let ping_secs = config.push.ping_interval_secs;
        Ok(PushConfig {
            url: config.push_url()?,
            topic: config.feed().topic().to_string(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms()),
            growth: config.push.growth,
            max_reconnect_delay: Duration::from_secs(config.push.max_reconnect_delay_secs),
            connect_timeout: Duration::from_secs(config.push.connect_timeout_secs),
            ping_interval: (ping_secs > 0).then(|| Duration::from_secs(ping_secs)),
        })
    }

    /// Builds the reconnect delay policy.
    fn create_backoff(&self) -> Box<dyn Backoff + Send> {
        match self.growth {
            ReconnectGrowth::Fixed => Box::new(Constant::new(self.reconnect_delay)),
            ReconnectGrowth::Exponential => {
                let mut backoff = ExponentialBackoff {
                    current_interval: self.reconnect_delay,
                    initial_interval: self.reconnect_delay,
                    max_interval: self.max_reconnect_delay.max(self.reconnect_delay),
                    multiplier: 2.0,
                    max_elapsed_time: None, // Never give up
                    ..Default::default()
                };
                backoff.reset();
                Box::new(backoff)
            }
        }
    }
}

// =============================================================================
// Push Statistics
// =============================================================================

/// Counters for one push channel, across reconnects and restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    /// Connections that reached Open.
    pub opens: u64,
    /// Connect attempts that failed or timed out.
    pub connect_failures: u64,
    /// Subscribe messages sent.
    pub subscribes_sent: u64,
    /// Text messages received.
    pub messages: u64,
    /// Snapshots forwarded to the sink.
    pub delivered: u64,
    /// Messages dropped as unparseable.
    pub parse_failures: u64,
    /// Health sections forwarded from other topics' messages.
    pub health_forwarded: u64,
    /// Messages for other topics with nothing to forward.
    pub ignored: u64,
}

#[derive(Default)]
struct PushCounters {
    opens: AtomicU64,
    connect_failures: AtomicU64,
    subscribes_sent: AtomicU64,
    messages: AtomicU64,
    delivered: AtomicU64,
    parse_failures: AtomicU64,
    health_forwarded: AtomicU64,
    ignored: AtomicU64,
}

impl PushCounters {
    fn snapshot(&self) -> PushStats {
        PushStats {
            opens: self.opens.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            subscribes_sent: self.subscribes_sent.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            health_forwarded: self.health_forwarded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Push Channel
// =============================================================================

struct Running {
    shutdown_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
}

/// Persistent streaming connection with automatic recovery.
///
/// ## Usage
/// ```rust,ignore
/// let push = PushChannel::new(PushConfig::from_link_config(&config)?, diagnostics);
/// let (tx, mut rx) = mpsc::channel(64);
/// push.start(tx);
///
/// while let Some(delivery) = rx.recv().await {
///     println!("{:?}", delivery.snapshot);
/// }
/// ```
pub struct PushChannel {
    config: PushConfig,
    diagnostics: Arc<dyn Diagnostics>,
    status: Arc<RwLock<ChannelStatus>>,
    counters: Arc<PushCounters>,
    running: Mutex<Option<Running>>,
}

impl PushChannel {
    pub fn new(config: PushConfig, diagnostics: Arc<dyn Diagnostics>) -> Self {
        PushChannel {
            config,
            diagnostics,
            status: Arc::new(RwLock::new(ChannelStatus::Idle)),
            counters: Arc::new(PushCounters::default()),
            running: Mutex::new(None),
        }
    }

    /// Opens the connection and keeps it open until [`stop`](Self::stop).
    ///
    /// A no-op returning `false` if the channel is already running; a second
    /// call never opens a second connection.
    pub fn start(&self, sink: mpsc::Sender<Delivery>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = running.as_ref() {
            if !current.worker.is_finished() {
                debug!(url = %self.config.url, "Push channel already running");
                return false;
            }
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = PushWorker {
            config: self.config.clone(),
            sink,
            diagnostics: self.diagnostics.clone(),
            status: self.status.clone(),
            counters: self.counters.clone(),
            shutdown_rx,
        };

        *running = Some(Running {
            shutdown_tx,
            worker: tokio::spawn(worker.run()),
        });
        true
    }

    /// Closes the connection without scheduling a reconnect.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Running {
            shutdown_tx,
            worker,
        }) = running
        {
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = worker.await {
                warn!(?e, "Push worker ended abnormally");
            }
        }

        *self.status.write().await = ChannelStatus::Idle;
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |r| !r.worker.is_finished())
    }

    pub async fn status(&self) -> ChannelStatus {
        *self.status.read().await
    }

    pub async fn is_open(&self) -> bool {
        *self.status.read().await == ChannelStatus::Open
    }

    pub fn stats(&self) -> PushStats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }
}

// =============================================================================
// Push Worker
// =============================================================================

/// Why a connection loop returned.
enum Exit {
    /// Device closed the connection or the stream ended.
    Closed,
    /// `stop()` was called.
    Shutdown,
    /// Nobody is listening for snapshots any more.
    SinkClosed,
}

struct PushWorker {
    config: PushConfig,
    sink: mpsc::Sender<Delivery>,
    diagnostics: Arc<dyn Diagnostics>,
    status: Arc<RwLock<ChannelStatus>>,
    counters: Arc<PushCounters>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PushWorker {
    /// Main connection loop.
    async fn run(mut self) {
        info!(url = %self.config.url, topic = %self.config.topic, "Push channel starting");

        let mut backoff = self.config.create_backoff();

        loop {
            *self.status.write().await = ChannelStatus::Connecting;

            let connected = tokio::select! {
                result = connect_with_timeout(&self.config) => result,
                _ = self.shutdown_rx.recv() => break,
            };

            match connected {
                Ok(ws_stream) => {
                    let connection_id = Uuid::new_v4();
                    info!(%connection_id, url = %self.config.url, "Push connection open");
                    *self.status.write().await = ChannelStatus::Open;
                    self.counters.opens.fetch_add(1, Ordering::Relaxed);
                    backoff.reset();

                    match self.connection_loop(ws_stream, connection_id).await {
                        Ok(Exit::Shutdown) => break,
                        Ok(Exit::SinkClosed) => {
                            debug!(%connection_id, "Snapshot receiver dropped, push channel exiting");
                            break;
                        }
                        Ok(Exit::Closed) => {
                            self.diagnostics
                                .warning("push", &format!("connection {} closed", connection_id));
                        }
                        Err(e) => {
                            self.diagnostics.warning(
                                "push",
                                &format!("connection {} lost: {}", connection_id, e),
                            );
                        }
                    }
                }
                Err(e) => {
                    self.counters.connect_failures.fetch_add(1, Ordering::Relaxed);
                    self.diagnostics
                        .warning("push", &format!("connect to {} failed: {}", self.config.url, e));
                }
            }

            *self.status.write().await = ChannelStatus::Closed;

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.config.reconnect_delay);
            debug!(?delay, "Waiting before reconnect");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during reconnect delay");
                    break;
                }
            }
        }

        *self.status.write().await = ChannelStatus::Idle;
        info!(url = %self.config.url, "Push channel stopped");
    }

    /// Runs one connection lifetime: subscribe, then pump frames.
    async fn connection_loop(
        &mut self,
        ws_stream: WsStream,
        connection_id: Uuid,
    ) -> LinkResult<Exit> {
        let (mut write, mut read) = ws_stream.split();

        // Subscriptions do not survive a reconnect on the device side.
        let subscribe = SubscribeMessage::new(self.config.topic.as_str()).to_json()?;
        write.send(WsMessage::Text(subscribe.into())).await?;
        self.counters.subscribes_sent.fetch_add(1, Ordering::Relaxed);
        debug!(%connection_id, topic = %self.config.topic, "Subscribed");

        let pinging = self.config.ping_interval.is_some();
        let period = self.config.ping_interval.unwrap_or(Duration::from_secs(3600));
        let mut ping_interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if !self.handle_text(&text).await {
                                return Ok(Exit::SinkClosed);
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            debug!(%connection_id, "Received pong");
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(%connection_id, ?frame, "Received close frame");
                            return Ok(Exit::Closed);
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                            self.diagnostics.error("push", "discarding unexpected binary message");
                        }
                        Some(Ok(WsMessage::Frame(_))) => {
                            // Raw frame, ignore
                        }
                        Some(Err(e)) => return Err(LinkError::from(e)),
                        None => return Ok(Exit::Closed),
                    }
                }

                _ = ping_interval.tick(), if pinging => {
                    write.send(WsMessage::Ping(Vec::<u8>::new().into())).await?;
                    debug!(%connection_id, "Sent ping");
                }

                _ = self.shutdown_rx.recv() => {
                    info!(%connection_id, "Shutdown signal received, closing connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(Exit::Shutdown);
                }
            }
        }
    }

    /// Routes one text message. Returns `false` once the sink is gone.
    async fn handle_text(&self, text: &str) -> bool {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);

        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                self.diagnostics
                    .error("push", &format!("discarding malformed message: {}", e));
                return true;
            }
        };

        let snapshot = if envelope.topic() == Some(self.config.topic.as_str()) {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            envelope.into_snapshot()
        } else {
            match envelope.resource_health() {
                Some(health) => {
                    self.counters.health_forwarded.fetch_add(1, Ordering::Relaxed);
                    Snapshot {
                        resource_health: Some(health),
                        ..Default::default()
                    }
                }
                None => {
                    self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                    debug!(topic = ?envelope.topic(), "Ignoring message for other topic");
                    return true;
                }
            }
        };

        self.sink
            .send(Delivery::new(Source::Push, snapshot))
            .await
            .is_ok()
    }
}

/// Connects with timeout.
async fn connect_with_timeout(config: &PushConfig) -> LinkResult<WsStream> {
    let connect_future = connect_async(config.url.as_str());

    match timeout(config.connect_timeout, connect_future).await {
        Ok(Ok((ws_stream, response))) => {
            debug!(status = ?response.status(), "WebSocket handshake complete");
            Ok(ws_stream)
        }
        Ok(Err(e)) => Err(LinkError::from(e)),
        Err(_) => Err(LinkError::Timeout(config.connect_timeout.as_millis() as u64)),
    }
}
