//! # Poll Channel
//!
//! Periodic fetch of the full device state over HTTP.
//!
//! ## Poll Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Poll Cycle                                    │
//! │                                                                         │
//! │   start(interval) ──► cycle begins immediately                          │
//! │                                                                         │
//! │   ┌──────────────────────────────────────────────────────────────────┐ │
//! │   │ 1. abort any request still outstanding                          │ │
//! │   │ 2. GET <poll path>                                              │ │
//! │   │ 3. race: response ◄──► interval elapsed ◄──► stop               │ │
//! │   │                                                                  │ │
//! │   │    200 + JSON  ──► Snapshot ──► sink          then wait interval│ │
//! │   │    other / err ──► Diagnostics               then wait interval │ │
//! │   │    interval    ──► request superseded        next cycle now     │ │
//! │   │    stop        ──► request aborted           worker exits       │ │
//! │   └──────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! │   At most one request is in flight, ever. Failures never stop the      │
//! │   cadence.                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use microbox_core::Snapshot;

use crate::channel::{ChannelStatus, Delivery, Source};
use crate::collaborators::Diagnostics;
use crate::error::{LinkError, LinkResult};
use crate::protocol::Envelope;

// =============================================================================
// Poll Statistics
// =============================================================================

/// Counters for one poll channel, across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Cycles started.
    pub cycles: u64,
    /// Snapshots handed to the sink.
    pub delivered: u64,
    /// Cycles that ended in a transport or parse failure.
    pub failures: u64,
    /// Requests aborted because the interval ran out first.
    pub superseded: u64,
}

#[derive(Default)]
struct PollCounters {
    cycles: AtomicU64,
    delivered: AtomicU64,
    failures: AtomicU64,
    superseded: AtomicU64,
}

impl PollCounters {
    fn snapshot(&self) -> PollStats {
        PollStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Poll Channel
// =============================================================================

struct Running {
    shutdown_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
}

/// Self-rescheduling full-state poller.
pub struct PollChannel {
    client: reqwest::Client,
    url: Url,
    diagnostics: Arc<dyn Diagnostics>,
    status: Arc<RwLock<ChannelStatus>>,
    counters: Arc<PollCounters>,
    running: Mutex<Option<Running>>,
}

impl PollChannel {
    pub fn new(client: reqwest::Client, url: Url, diagnostics: Arc<dyn Diagnostics>) -> Self {
        PollChannel {
            client,
            url,
            diagnostics,
            status: Arc::new(RwLock::new(ChannelStatus::Idle)),
            counters: Arc::new(PollCounters::default()),
            running: Mutex::new(None),
        }
    }

    /// Starts polling every `interval`, forwarding snapshots into `sink`.
    ///
    /// A no-op returning `false` if the channel is already running, so
    /// repeated initialization never stacks a second timer.
    pub fn start(&self, interval: Duration, sink: mpsc::Sender<Delivery>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = running.as_ref() {
            if !current.worker.is_finished() {
                debug!(url = %self.url, "Poll channel already running");
                return false;
            }
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = PollWorker {
            client: self.client.clone(),
            url: self.url.clone(),
            interval,
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

    /// Stops polling and aborts the in-flight request, if any.
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
            // Closed channel means the worker already exited.
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = worker.await {
                warn!(?e, "Poll worker ended abnormally");
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

    pub fn stats(&self) -> PollStats {
        self.counters.snapshot()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

// =============================================================================
// Poll Worker
// =============================================================================

struct PollWorker {
    client: reqwest::Client,
    url: Url,
    interval: Duration,
    sink: mpsc::Sender<Delivery>,
    diagnostics: Arc<dyn Diagnostics>,
    status: Arc<RwLock<ChannelStatus>>,
    counters: Arc<PollCounters>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl PollWorker {
    async fn run(mut self) {
        info!(url = %self.url, interval_ms = self.interval.as_millis() as u64, "Poll channel starting");

        loop {
            self.counters.cycles.fetch_add(1, Ordering::Relaxed);
            *self.status.write().await = ChannelStatus::Connecting;

            let mut request = tokio::spawn(fetch_snapshot(self.client.clone(), self.url.clone()));
            let deadline = tokio::time::sleep(self.interval);
            tokio::pin!(deadline);

            let joined = tokio::select! {
                joined = &mut request => joined,
                _ = &mut deadline => {
                    request.abort();
                    self.counters.superseded.fetch_add(1, Ordering::Relaxed);
                    *self.status.write().await = ChannelStatus::Closed;
                    self.diagnostics.warning(
                        "poll",
                        &format!("no response from {} within {:?}, reissuing", self.url, self.interval),
                    );
                    continue;
                }
                _ = self.shutdown_rx.recv() => {
                    request.abort();
                    break;
                }
            };

            let result = joined.unwrap_or_else(|e| Err(LinkError::ChannelError(e.to_string())));
            match result {
                Ok(snapshot) => {
                    *self.status.write().await = ChannelStatus::Open;
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(url = %self.url, "Poll snapshot received");

                    if self.sink.send(Delivery::new(Source::Poll, snapshot)).await.is_err() {
                        debug!("Snapshot receiver dropped, poll channel exiting");
                        break;
                    }
                }
                Err(e) => {
                    *self.status.write().await = ChannelStatus::Closed;
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    self.diagnostics.error("poll", &e.to_string());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        *self.status.write().await = ChannelStatus::Idle;
        info!(url = %self.url, "Poll channel stopped");
    }
}

/// One request/response round trip.
async fn fetch_snapshot(client: reqwest::Client, url: Url) -> LinkResult<Snapshot> {
    let response = client.get(url.clone()).send().await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(LinkError::HttpStatus {
            endpoint: url.path().to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    Ok(Envelope::from_json(&body)?.into_snapshot())
}
