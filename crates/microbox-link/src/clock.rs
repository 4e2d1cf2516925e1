//! # Local Clock Ticker
//!
//! Writes the local wall clock into the `time` and `date` slots once per
//! second, whatever the state of the device link.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use microbox_core::clock::ClockFace;
use microbox_core::{ElementUpdater, SlotKeys};

const TICK: Duration = Duration::from_secs(1);

struct Running {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

pub struct LocalClock {
    updater: Arc<ElementUpdater>,
    keys: SlotKeys,
    running: Mutex<Option<Running>>,
}

impl LocalClock {
    pub fn new(updater: Arc<ElementUpdater>, keys: SlotKeys) -> Self {
        LocalClock {
            updater,
            keys,
            running: Mutex::new(None),
        }
    }

    /// Starts ticking. The first tick is immediate.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().map_or(false, |r| !r.task.is_finished()) {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let updater = self.updater.clone();
        let keys = self.keys.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        ClockFace::at(&chrono::Local::now()).write(&updater, &keys);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Local clock stopped");
        });

        *running = Some(Running { shutdown_tx, task });
        true
    }

    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { shutdown_tx, task }) = running {
            let _ = shutdown_tx.send(()).await;
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microbox_core::updater::RecordingView;

    #[tokio::test]
    async fn test_first_tick_writes_time_and_date() {
        let view = Arc::new(RecordingView::with_slots(["time", "date"]));
        let clock = LocalClock::new(
            Arc::new(ElementUpdater::new(view.clone())),
            SlotKeys::default(),
        );

        assert!(clock.start());
        assert!(!clock.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        clock.stop().await;

        let time = view.text("time").unwrap();
        assert!(time.ends_with("AM") || time.ends_with("PM"));
        assert_eq!(time.len(), "hh:mm:ss AM".len());
        assert_eq!(view.text("date").unwrap().matches('/').count(), 2);
    }
}
