//! # Element Updater
//!
//! The single writer of presentation slots.
//!
//! ## Write Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  write(key, value)                                                      │
//! │                                                                         │
//! │   view has no slot `key`?  ──► no-op (the view may omit slots)          │
//! │   value == last written?   ──► no-op                                    │
//! │   otherwise                ──► view.render(key, value)                  │
//! │                                last_written[key] = value                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The compare and the render happen under one lock, so two writers racing
//! on the same slot still produce exactly one render per distinct value.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::slots::SlotValue;

// =============================================================================
// View Collaborator
// =============================================================================

/// The presentation layer, seen through the narrowest possible interface.
pub trait ViewSink: Send + Sync {
    /// Whether the current view exposes a slot with this key.
    fn has_slot(&self, key: &str) -> bool;

    /// Puts a value into a slot. Only called by [`ElementUpdater`].
    fn render(&self, key: &str, value: &SlotValue);

    /// Throws the whole view away and rebuilds it from scratch.
    fn reload(&self);
}

// =============================================================================
// Element Updater
// =============================================================================

/// Idempotent, change-detecting slot writer.
pub struct ElementUpdater {
    view: Arc<dyn ViewSink>,
    last_written: Mutex<HashMap<String, SlotValue>>,
}

impl ElementUpdater {
    pub fn new(view: Arc<dyn ViewSink>) -> Self {
        ElementUpdater {
            view,
            last_written: Mutex::new(HashMap::new()),
        }
    }

    /// Writes `value` into slot `key` if the slot exists and the value changed.
    ///
    /// Returns `true` when a render actually happened.
    pub fn write(&self, key: &str, value: SlotValue) -> bool {
        if !self.view.has_slot(key) {
            trace!(slot = key, "Slot not present in view, skipping");
            return false;
        }

        let mut last = self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if last.get(key) == Some(&value) {
            return false;
        }

        self.view.render(key, &value);
        last.insert(key.to_string(), value);
        true
    }

    /// Last value rendered into `key`, if any.
    pub fn last_written(&self, key: &str) -> Option<SlotValue> {
        self.last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Asks the view for a full reload.
    ///
    /// A reloaded view starts blank, so the change-detection cache is
    /// cleared with it.
    ///
    /// The cache lock is held across the view reload, so a concurrent write
    /// lands either before the wipe (and is forgotten with it) or after it.
    pub fn reload_view(&self) {
        let mut last = self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.view.reload();
        last.clear();
    }

    /// Drops every remembered value; the next write to each slot renders.
    pub fn forget_all(&self) {
        self.last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// =============================================================================
// Recording View
// =============================================================================

/// A [`ViewSink`] that keeps every render in memory.
///
/// Used by tests across the workspace and by headless runs.
#[derive(Default)]
pub struct RecordingView {
    /// `None` accepts every key.
    slots: Option<HashSet<String>>,
    current: Mutex<HashMap<String, SlotValue>>,
    renders: Mutex<Vec<(String, SlotValue)>>,
    reloads: AtomicUsize,
}

impl RecordingView {
    /// A view exposing exactly the given slots.
    pub fn with_slots<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordingView {
            slots: Some(slots.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// A view that claims to have every slot.
    pub fn accepting_all() -> Self {
        RecordingView::default()
    }

    pub fn value(&self, key: &str) -> Option<SlotValue> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.value(key).and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn checked(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(|v| v.as_checked())
    }

    /// Number of renders that hit `key`.
    pub fn render_count(&self, key: &str) -> usize {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    pub fn total_renders(&self) -> usize {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl ViewSink for RecordingView {
    fn has_slot(&self, key: &str) -> bool {
        self.slots.as_ref().map_or(true, |slots| slots.contains(key))
    }

    fn render(&self, key: &str, value: &SlotValue) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_string(), value.clone()));
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(slots: &[&str]) -> (Arc<RecordingView>, ElementUpdater) {
        let view = Arc::new(RecordingView::with_slots(slots.iter().copied()));
        let updater = ElementUpdater::new(view.clone());
        (view, updater)
    }

    #[test]
    fn test_same_value_written_once() {
        let (view, updater) = setup(&["server-temp"]);

        assert!(updater.write("server-temp", SlotValue::text("24.5°C")));
        assert!(!updater.write("server-temp", SlotValue::text("24.5°C")));

        assert_eq!(view.render_count("server-temp"), 1);
    }

    #[test]
    fn test_changed_value_is_written() {
        let (view, updater) = setup(&["server-temp"]);

        updater.write("server-temp", SlotValue::text("24.5°C"));
        updater.write("server-temp", SlotValue::text("25°C"));

        assert_eq!(view.render_count("server-temp"), 2);
        assert_eq!(view.text("server-temp").as_deref(), Some("25°C"));
    }

    #[test]
    fn test_missing_slot_is_noop() {
        let (view, updater) = setup(&["server-temp"]);

        assert!(!updater.write("server-hum", SlotValue::text("60%")));
        assert_eq!(view.total_renders(), 0);
        assert_eq!(updater.last_written("server-hum"), None);
    }

    #[test]
    fn test_reload_clears_cache() {
        let (view, updater) = setup(&["relay1"]);

        updater.write("relay1", SlotValue::Checked(true));
        updater.reload_view();
        assert_eq!(view.reload_count(), 1);

        // Fresh view: the same value must render again.
        assert!(updater.write("relay1", SlotValue::Checked(true)));
        assert_eq!(view.render_count("relay1"), 2);
    }

    /// Signals when a reload starts, then takes its time finishing it.
    struct SlowReloadView {
        inner: RecordingView,
        reload_started: Mutex<std::sync::mpsc::Sender<()>>,
    }

    impl ViewSink for SlowReloadView {
        fn has_slot(&self, key: &str) -> bool {
            self.inner.has_slot(key)
        }

        fn render(&self, key: &str, value: &SlotValue) {
            self.inner.render(key, value);
        }

        fn reload(&self) {
            let _ = self
                .reload_started
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(());
            std::thread::sleep(std::time::Duration::from_millis(100));
            self.inner.reload();
        }
    }

    #[test]
    fn test_write_during_reload_survives_the_wipe() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let view = Arc::new(SlowReloadView {
            inner: RecordingView::with_slots(["date"]),
            reload_started: Mutex::new(started_tx),
        });
        let updater = Arc::new(ElementUpdater::new(view.clone()));

        let reloader = {
            let updater = updater.clone();
            std::thread::spawn(move || updater.reload_view())
        };
        started_rx.recv().unwrap();

        let date = SlotValue::text("1/5/2025");
        assert!(updater.write("date", date.clone()));
        reloader.join().unwrap();

        assert_eq!(view.inner.value("date"), Some(date.clone()));
        assert_eq!(updater.last_written("date"), Some(date.clone()));
        assert!(!updater.write("date", date));
        assert_eq!(view.inner.reload_count(), 1);
    }

    #[test]
    fn test_concurrent_writers_render_once() {
        let (view, updater) = setup(&["time"]);
        let updater = Arc::new(updater);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let updater = updater.clone();
                std::thread::spawn(move || {
                    updater.write("time", SlotValue::text("01:00:00 PM"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(view.render_count("time"), 1);
    }
}
