//! # Terminal View
//!
//! A [`ViewSink`] that logs every render and keeps the current slot values
//! for the `status` command. A reload clears the slots and wakes the main
//! loop, which rebuilds the link from scratch.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{info, warn};

use microbox_core::{SlotValue, ViewSink};

#[derive(Default)]
pub struct TerminalView {
    slots: Mutex<BTreeMap<String, SlotValue>>,
    reload: Notify,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot values, sorted by key.
    pub fn slots(&self) -> Vec<(String, SlotValue)> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolves after the next reload request.
    pub async fn reload_requested(&self) {
        self.reload.notified().await;
    }
}

impl ViewSink for TerminalView {
    fn has_slot(&self, _key: &str) -> bool {
        true
    }

    fn render(&self, key: &str, value: &SlotValue) {
        info!(slot = key, %value, "Render");
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
    }

    fn reload(&self) {
        warn!("View reload requested");
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.reload.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_render_keeps_latest_value() {
        let view = TerminalView::new();
        view.render("server-temp", &SlotValue::text("20°C"));
        view.render("server-temp", &SlotValue::text("21°C"));
        view.render("relay1", &SlotValue::Checked(true));

        assert_eq!(
            view.slots(),
            vec![
                ("relay1".to_string(), SlotValue::Checked(true)),
                ("server-temp".to_string(), SlotValue::text("21°C")),
            ]
        );
    }

    #[tokio::test]
    async fn test_reload_clears_and_wakes() {
        let view = Arc::new(TerminalView::new());
        view.render("time", &SlotValue::text("10:00:00 AM"));

        // The permit is stored even when nobody is waiting yet.
        view.reload();
        tokio::time::timeout(Duration::from_secs(1), view.reload_requested())
            .await
            .unwrap();

        assert!(view.slots().is_empty());
    }
}
