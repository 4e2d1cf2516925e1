//! # Presentation Slots
//!
//! Slot keys, slot values and the formatting rules that turn snapshot
//! fields into the text a slot shows.
//!
//! ## Default Slot Layout
//! ```text
//! ┌──────────────────────────┬──────────────────────────┬──────────────────┐
//! │ Field                    │ Slot key                 │ Example value    │
//! ├──────────────────────────┼──────────────────────────┼──────────────────┤
//! │ temperature              │ server-temp              │ "24.5°C"         │
//! │ humidity                 │ server-hum               │ "60%"            │
//! │ soil_level               │ server-soillvl           │ "40%"            │
//! │ watering_active          │ server-WateringState     │ "Watering"       │
//! │ device clock date        │ server-date              │ "2025-01-31"     │
//! │ device clock time        │ server-time              │ "13:05:09"       │
//! │ local clock time         │ time                     │ "01:05:09 PM"    │
//! │ local clock date         │ date                     │ "1/31/2025"      │
//! │ relay map entry          │ <target_element_id>      │ checked=true     │
//! └──────────────────────────┴──────────────────────────┴──────────────────┘
//! ```
//!
//! A field that the device left out is written as [`PLACEHOLDER`]: absence is
//! itself worth showing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::Reading;

/// Text written for any missing upstream value.
pub const PLACEHOLDER: &str = "N/A";

// =============================================================================
// Slot Value
// =============================================================================

/// The value held by one presentation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// Text content (readings, labels, clock).
    Text(String),
    /// Checked/on state of a toggle slot.
    Checked(bool),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        SlotValue::Text(value.into())
    }

    pub fn placeholder() -> Self {
        SlotValue::Text(PLACEHOLDER.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SlotValue::Text(text) => Some(text),
            SlotValue::Checked(_) => None,
        }
    }

    pub fn as_checked(&self) -> Option<bool> {
        match self {
            SlotValue::Checked(on) => Some(*on),
            SlotValue::Text(_) => None,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Text(text) => f.write_str(text),
            SlotValue::Checked(true) => f.write_str("[x]"),
            SlotValue::Checked(false) => f.write_str("[ ]"),
        }
    }
}

// =============================================================================
// Slot Keys
// =============================================================================

/// Mapping from logical fields to presentation slot keys.
///
/// Relay slots are not listed here: each relay names its own target element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotKeys {
    pub temperature: String,
    pub humidity: String,
    pub soil_level: String,
    pub watering_state: String,
    pub device_date: String,
    pub device_time: String,
    pub local_time: String,
    pub local_date: String,
}

impl Default for SlotKeys {
    fn default() -> Self {
        SlotKeys {
            temperature: "server-temp".to_string(),
            humidity: "server-hum".to_string(),
            soil_level: "server-soillvl".to_string(),
            watering_state: "server-WateringState".to_string(),
            device_date: "server-date".to_string(),
            device_time: "server-time".to_string(),
            local_time: "time".to_string(),
            local_date: "date".to_string(),
        }
    }
}

impl SlotKeys {
    /// All keys, in declaration order.
    pub fn all(&self) -> [&str; 8] {
        [
            &self.temperature,
            &self.humidity,
            &self.soil_level,
            &self.watering_state,
            &self.device_date,
            &self.device_time,
            &self.local_time,
            &self.local_date,
        ]
    }

    /// Rejects layouts where two fields would fight over one slot.
    pub fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for key in self.all() {
            if !seen.insert(key) {
                return Err(CoreError::DuplicateSlotKey(key.to_string()));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Formatting
// =============================================================================

fn with_suffix(reading: Option<&Reading>, suffix: &str) -> SlotValue {
    match reading {
        Some(r) => SlotValue::Text(format!("{}{}", r, suffix)),
        None => SlotValue::placeholder(),
    }
}

pub fn format_temperature(reading: Option<&Reading>) -> SlotValue {
    with_suffix(reading, "°C")
}

/// Humidity and soil moisture share the percent rendering.
pub fn format_percent(reading: Option<&Reading>) -> SlotValue {
    with_suffix(reading, "%")
}

pub fn format_watering(active: Option<bool>) -> SlotValue {
    match active {
        Some(true) => SlotValue::text("Watering"),
        Some(false) => SlotValue::text("Standby"),
        None => SlotValue::placeholder(),
    }
}

/// Free text from the device; blank counts as missing.
pub fn format_text(value: Option<&str>) -> SlotValue {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => SlotValue::text(text),
        _ => SlotValue::placeholder(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_formats() {
        let temp: Reading = "24.5".parse().unwrap();
        let hum: Reading = "60".parse().unwrap();
        assert_eq!(format_temperature(Some(&temp)), SlotValue::text("24.5°C"));
        assert_eq!(format_percent(Some(&hum)), SlotValue::text("60%"));
        assert_eq!(format_temperature(None), SlotValue::text(PLACEHOLDER));
    }

    #[test]
    fn test_watering_labels() {
        assert_eq!(format_watering(Some(true)), SlotValue::text("Watering"));
        assert_eq!(format_watering(Some(false)), SlotValue::text("Standby"));
        assert_eq!(format_watering(None), SlotValue::placeholder());
    }

    #[test]
    fn test_text_blank_is_placeholder() {
        assert_eq!(format_text(Some("  ")), SlotValue::placeholder());
        assert_eq!(format_text(Some("12:00")), SlotValue::text("12:00"));
        assert_eq!(format_text(None), SlotValue::placeholder());
    }

    #[test]
    fn test_slot_keys_validation() {
        let mut keys = SlotKeys::default();
        assert!(keys.validate().is_ok());

        keys.humidity = keys.temperature.clone();
        assert_eq!(
            keys.validate(),
            Err(CoreError::DuplicateSlotKey("server-temp".into()))
        );
    }

    #[test]
    fn test_slot_value_display() {
        assert_eq!(SlotValue::Checked(true).to_string(), "[x]");
        assert_eq!(SlotValue::text("60%").to_string(), "60%");
    }
}
