//! # State Sync Core
//!
//! Owns one poll and one push channel, merges what either delivers into the
//! view, and watches device health.
//!
//! ## Core Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StateSyncCore                                    │
//! │                                                                         │
//! │  ┌────────────────┐                      ┌────────────────┐            │
//! │  │  PollChannel   │── Delivery ──┐  ┌────│  PushChannel   │            │
//! │  │  (HTTP GET)    │              ▼  ▼    │  (WebSocket)   │            │
//! │  └────────────────┘        ┌────────────┐└────────────────┘            │
//! │                            │   merge    │                              │
//! │                            │   router   │                              │
//! │                            └─────┬──────┘                              │
//! │                                  │                                      │
//! │              free_heap <= threshold?                                    │
//! │               yes │               │ no                                  │
//! │                   ▼               ▼                                     │
//! │       reload view (once     apply_snapshot ──► ElementUpdater           │
//! │       per start, snapshot                                               │
//! │       not merged)                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deliveries from the two channels interleave freely. Each one is applied
//! whole, so the last applied value wins per field.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use microbox_core::{apply_snapshot, DistressPolicy, ElementUpdater, SlotKeys};

use crate::channel::{ChannelStatus, Delivery, Source};
use crate::collaborators::{Diagnostics, TracingDiagnostics};
use crate::error::{LinkError, LinkResult};
use crate::poll::{PollChannel, PollStats};
use crate::transport::{PushChannel, PushStats};

/// Buffer between the channels and the merge router.
const DELIVERY_BUFFER: usize = 64;

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Whether the core is started.
    pub running: bool,

    pub poll: ChannelStatus,
    pub push: ChannelStatus,

    pub poll_stats: PollStats,
    pub push_stats: PushStats,

    /// Snapshots merged from the poll channel.
    pub merged_from_poll: u64,

    /// Snapshots merged from the push channel.
    pub merged_from_push: u64,

    /// Slot writes that changed something.
    pub slots_rendered: u64,

    /// Reload directives issued.
    pub reloads: u64,
}

#[derive(Default)]
struct CoreCounters {
    merged_from_poll: AtomicU64,
    merged_from_push: AtomicU64,
    slots_rendered: AtomicU64,
    reloads: AtomicU64,
}

// =============================================================================
// State Sync Core
// =============================================================================

struct Router {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
    /// Channels this start actually launched; only these are stopped.
    owns_poll: bool,
    owns_push: bool,
}

/// Public start/stop surface of the dual-channel sync.
pub struct StateSyncCore {
    poll: Arc<PollChannel>,
    push: Arc<PushChannel>,
    updater: Arc<ElementUpdater>,
    keys: Arc<SlotKeys>,
    policy: DistressPolicy,
    diagnostics: Arc<dyn Diagnostics>,
    counters: Arc<CoreCounters>,
    router: Mutex<Option<Router>>,
}

impl StateSyncCore {
    pub fn builder(updater: Arc<ElementUpdater>) -> StateSyncCoreBuilder {
        StateSyncCoreBuilder::new(updater)
    }

    /// Wires both channels to the merge and starts them.
    ///
    /// The poll channel fires its first request immediately. Returns `false`
    /// without touching anything if the core is already running, or if both
    /// channels are already running under another core.
    pub fn start(&self, poll_interval: Duration) -> bool {
        let mut router = self.router.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = router.as_ref() {
            if !current.task.is_finished() {
                debug!("State sync core already running");
                return false;
            }
        }

        if self.poll.is_running() && self.push.is_running() {
            info!("Channels already running under another core, not starting");
            return false;
        }

        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_BUFFER);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let merge = MergeRouter {
            updater: self.updater.clone(),
            keys: self.keys.clone(),
            policy: self.policy,
            diagnostics: self.diagnostics.clone(),
            counters: self.counters.clone(),
            reload_latched: false,
        };
        let task = tokio::spawn(merge.run(delivery_rx, shutdown_rx));

        let poll_started = self.poll.start(poll_interval, delivery_tx.clone());
        let push_started = self.push.start(delivery_tx);
        if !poll_started && !push_started {
            // Lost a race with another core; the router exits on its own.
            info!("Channels already running under another core, not starting");
            return false;
        }
        if !poll_started || !push_started {
            warn!(
                poll_started,
                push_started, "A channel was already running under another owner"
            );
        }

        info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            threshold = self.policy.threshold(),
            "State sync core started"
        );

        *router = Some(Router {
            shutdown_tx,
            task,
            owns_poll: poll_started,
            owns_push: push_started,
        });
        true
    }

    /// Stops the channels this core started, then the merge router.
    ///
    /// Channels started by another core sharing the same registry keep
    /// running.
    pub async fn stop(&self) {
        let router = self
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Router {
            shutdown_tx,
            task,
            owns_poll,
            owns_push,
        }) = router
        {
            if owns_poll {
                self.poll.stop().await;
            }
            if owns_push {
                self.push.stop().await;
            }

            let _ = shutdown_tx.send(()).await;
            if let Err(e) = task.await {
                warn!(?e, "Merge router ended abnormally");
            }
            info!("State sync core stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |r| !r.task.is_finished())
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            running: self.is_running(),
            poll: self.poll.status().await,
            push: self.push.status().await,
            poll_stats: self.poll.stats(),
            push_stats: self.push.stats(),
            merged_from_poll: self.counters.merged_from_poll.load(Ordering::Relaxed),
            merged_from_push: self.counters.merged_from_push.load(Ordering::Relaxed),
            slots_rendered: self.counters.slots_rendered.load(Ordering::Relaxed),
            reloads: self.counters.reloads.load(Ordering::Relaxed),
        }
    }

    pub fn updater(&self) -> &Arc<ElementUpdater> {
        &self.updater
    }

    pub fn poll_channel(&self) -> &Arc<PollChannel> {
        &self.poll
    }

    pub fn push_channel(&self) -> &Arc<PushChannel> {
        &self.push
    }
}

// =============================================================================
// Merge Router
// =============================================================================

struct MergeRouter {
    updater: Arc<ElementUpdater>,
    keys: Arc<SlotKeys>,
    policy: DistressPolicy,
    diagnostics: Arc<dyn Diagnostics>,
    counters: Arc<CoreCounters>,
    /// Set once a reload was issued during this start.
    reload_latched: bool,
}

impl MergeRouter {
    async fn run(
        mut self,
        mut delivery_rx: mpsc::Receiver<Delivery>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                delivery = delivery_rx.recv() => match delivery {
                    Some(delivery) => self.handle(delivery),
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!("Merge router stopped");
    }

    fn handle(&mut self, delivery: Delivery) {
        let Delivery { source, snapshot } = delivery;

        if self.policy.is_distressed(&snapshot) {
            if !self.reload_latched {
                self.reload_latched = true;
                self.counters.reloads.fetch_add(1, Ordering::Relaxed);

                let free_heap = snapshot.resource_health.map(|h| h.free_heap);
                warn!(%source, ?free_heap, threshold = self.policy.threshold(), "Device in distress, reloading view");
                self.diagnostics.warning(
                    "health",
                    &format!(
                        "free heap {:?} at or below {} (via {}), reloading view",
                        free_heap,
                        self.policy.threshold(),
                        source
                    ),
                );
                self.updater.reload_view();
            }
            return;
        }

        if snapshot.is_empty() {
            return;
        }

        let report = apply_snapshot(&self.updater, &self.keys, &snapshot);
        let merged = match source {
            Source::Poll => &self.counters.merged_from_poll,
            Source::Push => &self.counters.merged_from_push,
        };
        merged.fetch_add(1, Ordering::Relaxed);
        self.counters
            .slots_rendered
            .fetch_add(report.rendered as u64, Ordering::Relaxed);

        debug!(%source, rendered = report.rendered, skipped = report.skipped, "Snapshot merged");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a StateSyncCore with options.
pub struct StateSyncCoreBuilder {
    updater: Arc<ElementUpdater>,
    poll: Option<Arc<PollChannel>>,
    push: Option<Arc<PushChannel>>,
    keys: SlotKeys,
    policy: DistressPolicy,
    diagnostics: Arc<dyn Diagnostics>,
}

impl StateSyncCoreBuilder {
    pub fn new(updater: Arc<ElementUpdater>) -> Self {
        StateSyncCoreBuilder {
            updater,
            poll: None,
            push: None,
            keys: SlotKeys::default(),
            policy: DistressPolicy::default(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn poll(mut self, poll: Arc<PollChannel>) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn push(mut self, push: Arc<PushChannel>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn slot_keys(mut self, keys: SlotKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn distress_policy(mut self, policy: DistressPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn build(self) -> LinkResult<StateSyncCore> {
        let poll = self
            .poll
            .ok_or_else(|| LinkError::InvalidConfig("poll channel required".into()))?;
        let push = self
            .push
            .ok_or_else(|| LinkError::InvalidConfig("push channel required".into()))?;
        self.keys.validate()?;

        Ok(StateSyncCore {
            poll,
            push,
            updater: self.updater,
            keys: Arc::new(self.keys),
            policy: self.policy,
            diagnostics: self.diagnostics,
            counters: Arc::new(CoreCounters::default()),
            router: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RecordingDiagnostics;
    use microbox_core::updater::RecordingView;
    use microbox_core::{ServerMetrics, Snapshot};

    fn router() -> (Arc<RecordingView>, MergeRouter) {
        let view = Arc::new(RecordingView::accepting_all());
        let router = MergeRouter {
            updater: Arc::new(ElementUpdater::new(view.clone())),
            keys: Arc::new(SlotKeys::default()),
            policy: DistressPolicy::default(),
            diagnostics: Arc::new(RecordingDiagnostics::default()),
            counters: Arc::new(CoreCounters::default()),
            reload_latched: false,
        };
        (view, router)
    }

    fn metrics(temp: &str) -> Snapshot {
        Snapshot::default().with_metrics(ServerMetrics {
            temperature: temp.parse().ok(),
            ..Default::default()
        })
    }

    #[test]
    fn test_distress_reloads_once_from_either_channel() {
        let (view, mut router) = router();

        router.handle(Delivery::new(Source::Push, metrics("25").with_health(15.0, None)));
        router.handle(Delivery::new(Source::Poll, metrics("25").with_health(12.0, None)));

        assert_eq!(view.reload_count(), 1);
        assert_eq!(router.counters.reloads.load(Ordering::Relaxed), 1);
        // The distress snapshot itself is never merged.
        assert_eq!(view.text("server-temp"), None);
    }

    #[test]
    fn test_healthy_snapshot_is_merged() {
        let (view, mut router) = router();

        router.handle(Delivery::new(Source::Poll, metrics("24.5").with_health(180.0, None)));
        router.handle(Delivery::new(Source::Push, metrics("25")));

        assert_eq!(view.reload_count(), 0);
        assert_eq!(view.text("server-temp").as_deref(), Some("25°C"));
        assert_eq!(router.counters.merged_from_poll.load(Ordering::Relaxed), 1);
        assert_eq!(router.counters.merged_from_push.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_health_only_snapshot_writes_nothing() {
        let (view, mut router) = router();

        router.handle(Delivery::new(
            Source::Push,
            Snapshot::default().with_health(200.0, Some(320.0)),
        ));

        assert_eq!(view.total_renders(), 0);
        assert_eq!(router.counters.merged_from_push.load(Ordering::Relaxed), 0);
    }

    fn shared_channels() -> (Arc<PollChannel>, Arc<PushChannel>) {
        let config = crate::config::LinkConfig::for_host("127.0.0.1:9");
        let diagnostics: Arc<dyn Diagnostics> = Arc::new(RecordingDiagnostics::default());
        let poll = PollChannel::new(
            reqwest::Client::new(),
            config.poll_url().unwrap(),
            diagnostics.clone(),
        );
        let push = PushChannel::new(
            crate::transport::PushConfig::from_link_config(&config).unwrap(),
            diagnostics,
        );
        (Arc::new(poll), Arc::new(push))
    }

    fn core_over(poll: &Arc<PollChannel>, push: &Arc<PushChannel>) -> StateSyncCore {
        let view = Arc::new(RecordingView::accepting_all());
        StateSyncCore::builder(Arc::new(ElementUpdater::new(view)))
            .poll(poll.clone())
            .push(push.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_core_does_not_stop_shared_channels() {
        let (poll, push) = shared_channels();
        let first = core_over(&poll, &push);
        let second = core_over(&poll, &push);

        assert!(first.start(Duration::from_secs(1)));
        assert!(!second.start(Duration::from_secs(1)));
        assert!(!second.is_running());

        second.stop().await;
        assert!(first.is_running());
        assert!(poll.is_running());
        assert!(push.is_running());

        first.stop().await;
        assert!(!poll.is_running());
        assert!(!push.is_running());
    }

    #[test]
    fn test_builder_requires_channels() {
        let view = Arc::new(RecordingView::accepting_all());
        let result = StateSyncCore::builder(Arc::new(ElementUpdater::new(view))).build();
        assert!(matches!(result, Err(LinkError::InvalidConfig(_))));
    }
}
