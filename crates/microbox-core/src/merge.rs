//! # Snapshot Merge
//!
//! Turns a [`Snapshot`] into [`ElementUpdater`] writes, and decides when the
//! device is too starved of memory to keep going.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Merge Rules                                  │
//! │                                                                         │
//! │  • Last write wins per field. No cross-field transactions.             │
//! │  • Poll and push snapshots may arrive in any relative order.           │
//! │  • Section present  → every field in it is written                     │
//! │                       (missing field → "N/A").                          │
//! │  • Section absent   → nothing in it is touched.                        │
//! │  • Relay entries    → Checked(is_on) into slot `target_element_id`.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::slots::{
    format_percent, format_temperature, format_text, format_watering, SlotKeys, SlotValue,
};
use crate::types::Snapshot;
use crate::updater::ElementUpdater;
use crate::DEFAULT_DISTRESS_THRESHOLD;

// =============================================================================
// Merge
// =============================================================================

/// Outcome of one merge, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Writes that changed a slot.
    pub rendered: usize,
    /// Writes skipped because the slot was missing or unchanged.
    pub skipped: usize,
}

impl MergeReport {
    fn record(&mut self, rendered: bool) {
        if rendered {
            self.rendered += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Applies every section present in `snapshot` to the view.
pub fn apply_snapshot(
    updater: &ElementUpdater,
    keys: &SlotKeys,
    snapshot: &Snapshot,
) -> MergeReport {
    let mut report = MergeReport::default();

    if let Some(metrics) = &snapshot.server_metrics {
        report.record(updater.write(
            &keys.temperature,
            format_temperature(metrics.temperature.as_ref()),
        ));
        report.record(updater.write(&keys.humidity, format_percent(metrics.humidity.as_ref())));
        report.record(updater.write(
            &keys.soil_level,
            format_percent(metrics.soil_level.as_ref()),
        ));
        report.record(updater.write(
            &keys.watering_state,
            format_watering(metrics.watering_active),
        ));
    }

    for relay in snapshot.relay_states.values() {
        report.record(updater.write(&relay.target_element_id, SlotValue::Checked(relay.is_on)));
    }

    if let Some(clock) = &snapshot.clock {
        report.record(updater.write(&keys.device_date, format_text(clock.date.as_deref())));
        report.record(updater.write(&keys.device_time, format_text(clock.time.as_deref())));
    }

    report
}

// =============================================================================
// Distress Policy
// =============================================================================

/// Decides when reported heap headroom is too low to continue in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistressPolicy {
    threshold: f64,
}

impl DistressPolicy {
    pub fn new(threshold: f64) -> CoreResult<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(CoreError::InvalidThreshold(threshold));
        }
        Ok(DistressPolicy { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True when the snapshot reports free heap at or below the threshold.
    ///
    /// Snapshots without a health section are never in distress.
    pub fn is_distressed(&self, snapshot: &Snapshot) -> bool {
        snapshot
            .resource_health
            .map_or(false, |health| health.free_heap <= self.threshold)
    }
}

impl Default for DistressPolicy {
    fn default() -> Self {
        DistressPolicy {
            threshold: DEFAULT_DISTRESS_THRESHOLD,
        }
    }
}
