//! # Domain Types
//!
//! The records that flow through the link: snapshots coming in from the
//! device and command requests going out to it.
//!
//! ## Snapshot Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             Snapshot                                    │
//! │                                                                         │
//! │  server_metrics?   temperature? humidity? soil_level? watering_active?  │
//! │  relay_states      relay key ──► { target_element_id, is_on }          │
//! │  clock?            date? time?            (datetime feed)               │
//! │  resource_health?  free_heap, total_heap?                               │
//! │                                                                         │
//! │  Producer: poll or push decode step.  Consumer: merge.                  │
//! │  Single use: discarded once merged.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Reading
// =============================================================================

/// A sensor reading exactly as the device rendered it.
///
/// The link never reformats numbers: `24.5` stays `"24.5"`, `60` stays
/// `"60"`. Only the unit suffix is added when the value reaches a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(String);

impl Reading {
    /// Returns the reading text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Reading {
    type Err = CoreError;

    /// Accepts any non-empty text except the firmware's NaN markers.
    fn from_str(s: &str) -> CoreResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Err(CoreError::InvalidReading(s.to_string()));
        }
        Ok(Reading(trimmed.to_string()))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Snapshot Sections
// =============================================================================

/// Environmental readings and pump state (`data_server` section).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMetrics {
    pub temperature: Option<Reading>,
    pub humidity: Option<Reading>,
    pub soil_level: Option<Reading>,
    pub watering_active: Option<bool>,
}

/// One entry of the relay map (`data_relay` section).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    /// Id of the checkbox slot this relay drives.
    pub target_element_id: String,
    pub is_on: bool,
}

/// Device wall clock (`datetime` section).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceClock {
    pub date: Option<String>,
    pub time: Option<String>,
}

/// Heap headroom reported alongside push messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceHealth {
    pub free_heap: f64,
    pub total_heap: Option<f64>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// One complete or partial view of device state.
///
/// Sections that the source did not carry are `None` (or empty for the relay
/// map) and are left untouched by the merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub server_metrics: Option<ServerMetrics>,
    pub relay_states: BTreeMap<String, RelayState>,
    pub clock: Option<DeviceClock>,
    pub resource_health: Option<ResourceHealth>,
}

impl Snapshot {
    pub fn with_metrics(mut self, metrics: ServerMetrics) -> Self {
        self.server_metrics = Some(metrics);
        self
    }

    pub fn with_relay(mut self, key: &str, target_element_id: &str, is_on: bool) -> Self {
        self.relay_states.insert(
            key.to_string(),
            RelayState {
                target_element_id: target_element_id.to_string(),
                is_on,
            },
        );
        self
    }

    pub fn with_clock(mut self, clock: DeviceClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_health(mut self, free_heap: f64, total_heap: Option<f64>) -> Self {
        self.resource_health = Some(ResourceHealth {
            free_heap,
            total_heap,
        });
        self
    }

    /// True when the snapshot carries nothing the merge could write.
    pub fn is_empty(&self) -> bool {
        self.server_metrics.is_none() && self.relay_states.is_empty() && self.clock.is_none()
    }
}

// =============================================================================
// Command Request
// =============================================================================

/// Id of the pseudo-relay that mirrors the auto-watering policy.
pub const AUTO_WATERING_TARGET: &str = "auto";

/// Id used for the all-pumps manual watering switch.
pub const MANUAL_WATERING_TARGET: &str = "manual";

/// Which device resource a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A single relay, addressed by its pin/element id.
    Relay,
    /// The automatic watering policy switch.
    AutoWateringPolicy,
    /// Drive every pump relay at once (rejected while auto-watering is on).
    ManualWatering,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Relay => write!(f, "relay"),
            ResourceKind::AutoWateringPolicy => write!(f, "auto_watering"),
            ResourceKind::ManualWatering => write!(f, "manual_watering"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_lowercase().as_str() {
            "relay" | "check" => Ok(ResourceKind::Relay),
            "auto" | "auto_watering" | "auto-watering" => Ok(ResourceKind::AutoWateringPolicy),
            "manual" | "manual_watering" | "manual-watering" => Ok(ResourceKind::ManualWatering),
            other => Err(CoreError::UnknownResourceKind(other.to_string())),
        }
    }
}

/// A user-triggered state change, short-lived.
///
/// The desired state always comes from the caller; nothing is inferred from
/// earlier responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub target_id: String,
    pub desired_state: bool,
    pub resource_kind: ResourceKind,
}

impl CommandRequest {
    /// Toggle a single relay.
    pub fn relay(target_id: impl Into<String>, desired_state: bool) -> CoreResult<Self> {
        let target_id = target_id.into();
        if target_id.trim().is_empty() {
            return Err(CoreError::MissingTarget);
        }
        Ok(CommandRequest {
            target_id,
            desired_state,
            resource_kind: ResourceKind::Relay,
        })
    }

    /// Enable or disable the auto-watering policy.
    pub fn auto_watering(desired_state: bool) -> Self {
        CommandRequest {
            target_id: AUTO_WATERING_TARGET.to_string(),
            desired_state,
            resource_kind: ResourceKind::AutoWateringPolicy,
        }
    }

    /// Switch every pump relay on or off by hand.
    pub fn manual_watering(desired_state: bool) -> Self {
        CommandRequest {
            target_id: MANUAL_WATERING_TARGET.to_string(),
            desired_state,
            resource_kind: ResourceKind::ManualWatering,
        }
    }

    /// Desired state as the `0|1` query value the firmware expects.
    pub fn state_flag(&self) -> u8 {
        u8::from(self.desired_state)
    }
}

/// Parses a user-facing on/off token.
pub fn parse_desired_state(token: &str) -> CoreResult<bool> {
    match token.trim().to_lowercase().as_str() {
        "on" | "1" | "true" | "enable" | "enabled" => Ok(true),
        "off" | "0" | "false" | "disable" | "disabled" => Ok(false),
        other => Err(CoreError::InvalidDesiredState(other.to_string())),
    }
}
