//! # Wire Protocol
//!
//! JSON shapes the device speaks, and their translation into [`Snapshot`]s.
//!
//! ## Message Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Device → Dashboard                              │
//! │                                                                         │
//! │  {                                                                      │
//! │    "event": "data_server",                 (push only)                  │
//! │    "data_server": {                                                     │
//! │      "dht": { "temp": 24.5, "hum": 60 },                                │
//! │      "soil_moisture": 40,                                               │
//! │      "watering_state": true                                             │
//! │    },                                                                   │
//! │    "data_relay": {                                                      │
//! │      "r1":   { "id": "relay1", "status": true },                        │
//! │      "auto": { "id": "auto",   "status": 1 }                            │
//! │    },                                                                   │
//! │    "datetime":    { "date": "...", "time": "..." },                     │
//! │    "heap_memory": { "free_heap": "123.45", "total_heap": "320.00" }     │
//! │  }                                                                      │
//! │                                                                         │
//! │                         Dashboard → Device                              │
//! │                                                                         │
//! │  { "event": "data_server" }            once per push connection        │
//! │  GET /check?pinout=<id>&state=<0|1>    relay toggle                     │
//! │  GET /auto-watering?state=<0|1>        policy toggle                    │
//! │  GET /manual-watering?state=<0|1>      all pumps                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The firmware is loose with types: heap figures arrive as strings, relay
//! status as a bool, an integer or a string, readings may be `null`. Values
//! that cannot be understood decode as missing rather than failing the whole
//! message.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use microbox_core::{
    CommandRequest, DeviceClock, RelayState, ResourceHealth, ResourceKind, ServerMetrics,
    Snapshot,
};

use crate::error::LinkResult;

// =============================================================================
// Inbound Envelope
// =============================================================================

/// One message from the device, from either channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// Topic tag, only present on push messages.
    #[serde(default)]
    pub event: Option<String>,

    #[serde(default)]
    pub data_server: Option<WireMetrics>,

    #[serde(default)]
    pub data_relay: Option<BTreeMap<String, Value>>,

    #[serde(default)]
    pub datetime: Option<WireClock>,

    #[serde(default)]
    pub heap_memory: Option<WireHeap>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMetrics {
    #[serde(default)]
    pub dht: Option<WireDht>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub soil_moisture: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub watering_state: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDht {
    #[serde(default, deserialize_with = "lenient_text")]
    pub temp: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub hum: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireRelay {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub status: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireClock {
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireHeap {
    #[serde(default, deserialize_with = "lenient_number")]
    pub free_heap: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub total_heap: Option<f64>,
}

impl Envelope {
    /// Parses a raw message body.
    ///
    /// Fails only when the body is not a JSON object at all.
    pub fn from_json(body: &str) -> LinkResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn topic(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Heap figures, if the message carried a usable `free_heap`.
    pub fn resource_health(&self) -> Option<ResourceHealth> {
        let heap = self.heap_memory.as_ref()?;
        Some(ResourceHealth {
            free_heap: heap.free_heap?,
            total_heap: heap.total_heap,
        })
    }

    /// Converts the message into a snapshot.
    ///
    /// Relay entries without an `id` or a usable `status` are dropped: there
    /// is no slot to drive or nothing trustworthy to show.
    pub fn into_snapshot(self) -> Snapshot {
        let resource_health = self.resource_health();

        let server_metrics = self.data_server.map(|wire| {
            let dht = wire.dht.unwrap_or_default();
            ServerMetrics {
                temperature: dht.temp.and_then(|t| t.parse().ok()),
                humidity: dht.hum.and_then(|h| h.parse().ok()),
                soil_level: wire.soil_moisture.and_then(|s| s.parse().ok()),
                watering_active: wire.watering_state,
            }
        });

        let relay_states = self
            .data_relay
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| {
                let relay: WireRelay = serde_json::from_value(value).ok()?;
                let target_element_id = relay.id.filter(|id| !id.trim().is_empty())?;
                let is_on = relay.status?;
                Some((
                    key,
                    RelayState {
                        target_element_id,
                        is_on,
                    },
                ))
            })
            .collect();

        let clock = self.datetime.map(|wire| DeviceClock {
            date: wire.date,
            time: wire.time,
        });

        Snapshot {
            server_metrics,
            relay_states,
            clock,
            resource_health,
        }
    }
}

// =============================================================================
// Lenient Field Decoders
// =============================================================================

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(text_from_value))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(bool_from_value))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn text_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "on" | "high" => Some(true),
            "false" | "0" | "off" | "low" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// First and only message sent on each push connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub event: String,
}

impl SubscribeMessage {
    pub fn new(topic: impl Into<String>) -> Self {
        SubscribeMessage {
            event: topic.into(),
        }
    }

    pub fn to_json(&self) -> LinkResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builds the command URL for `request` against the device base URL.
///
/// Only the caller-supplied desired state is encoded.
pub fn command_url(base: &Url, request: &CommandRequest) -> LinkResult<Url> {
    let state = request.state_flag().to_string();
    let url = match request.resource_kind {
        ResourceKind::Relay => {
            let mut url = base.join("/check")?;
            url.query_pairs_mut()
                .append_pair("pinout", &request.target_id)
                .append_pair("state", &state);
            url
        }
        ResourceKind::AutoWateringPolicy => {
            let mut url = base.join("/auto-watering")?;
            url.query_pairs_mut().append_pair("state", &state);
            url
        }
        ResourceKind::ManualWatering => {
            let mut url = base.join("/manual-watering")?;
            url.query_pairs_mut().append_pair("state", &state);
            url
        }
    };
    Ok(url)
}
