//! # Link Configuration
//!
//! Where the device lives, which feed to follow, and the channel timings.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MICROBOX_HOST=192.168.4.1                                          │
//! │     MICROBOX_FEED=datetime                                             │
//! │     MICROBOX_POLL_INTERVAL_MS=1500                                     │
//! │     MICROBOX_RECONNECT_DELAY_MS=5000                                   │
//! │     MICROBOX_DISTRESS_THRESHOLD=20                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/microbox/link.toml (Linux)                               │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     data_server feed, 1500 ms poll, 5000 ms fixed reconnect            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! host = "192.168.4.1"
//! push_path = "/ws"
//!
//! [feed]
//! profile = "data_server"   # data_server | datetime
//!
//! [poll]
//! interval_ms = 1500
//!
//! [push]
//! reconnect_delay_ms = 5000
//! growth = "fixed"          # fixed | exponential
//!
//! [health]
//! distress_threshold = 20.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use microbox_core::{DistressPolicy, SlotKeys, DEFAULT_DISTRESS_THRESHOLD};

use crate::error::{LinkError, LinkResult};

// =============================================================================
// Feed Profile
// =============================================================================

/// Which snapshot stream the dashboard follows.
///
/// One profile names the push topic, the poll endpoint and the default
/// reconnect delay together, so the two channels always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedProfile {
    /// Sensors, pump state and relays.
    #[default]
    DataServer,

    /// Device wall clock.
    Datetime,
}

impl FeedProfile {
    /// Topic named in the subscribe message and matched on inbound messages.
    pub fn topic(&self) -> &'static str {
        match self {
            FeedProfile::DataServer => "data_server",
            FeedProfile::Datetime => "datetime",
        }
    }

    /// Full-state endpoint polled by the poll channel.
    pub fn poll_path(&self) -> &'static str {
        match self {
            FeedProfile::DataServer => "/data-server",
            FeedProfile::Datetime => "/datetime",
        }
    }

    /// Reconnect delay used when the config file does not set one.
    pub fn default_reconnect_delay_ms(&self) -> u64 {
        match self {
            FeedProfile::DataServer => 5000,
            FeedProfile::Datetime => 3000,
        }
    }
}

impl std::fmt::Display for FeedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

impl std::str::FromStr for FeedProfile {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "data_server" | "data" | "sensors" => Ok(FeedProfile::DataServer),
            "datetime" | "clock" => Ok(FeedProfile::Datetime),
            other => Err(LinkError::InvalidConfig(format!(
                "Unknown feed profile: '{}'. Valid options: data_server, datetime",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Settings
// =============================================================================

/// Where the controller answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// `host[:port]` of the device. The access-point default is 192.168.4.1.
    #[serde(default = "default_host")]
    pub host: String,

    /// Path of the push endpoint.
    #[serde(default = "default_push_path")]
    pub push_path: String,
}

fn default_host() -> String {
    "192.168.4.1".to_string()
}

fn default_push_path() -> String {
    "/ws".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            host: default_host(),
            push_path: default_push_path(),
        }
    }
}

/// Feed selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub profile: FeedProfile,
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Poll channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Time between the end of one cycle and the start of the next. A request
    /// still pending after this long is superseded.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1500
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval_ms: default_poll_interval(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How the reconnect delay evolves across consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectGrowth {
    /// Same delay every time.
    #[default]
    Fixed,

    /// Starts at the configured delay, doubles up to the maximum, resets
    /// after a successful open.
    Exponential,
}

/// Push channel timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    /// Delay between a close and the next connect attempt. Falls back to the
    /// feed profile's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,

    #[serde(default)]
    pub growth: ReconnectGrowth,

    /// Upper bound for exponential growth (seconds).
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,

    /// Connect attempt timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Keepalive ping interval (seconds). 0 disables pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_max_reconnect_delay() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    30
}

impl Default for PushSettings {
    fn default() -> Self {
        PushSettings {
            reconnect_delay_ms: None,
            growth: ReconnectGrowth::default(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

/// Command feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    /// How long the optimistic auto-watering toast stays up (milliseconds).
    #[serde(default = "default_feedback_toast")]
    pub feedback_toast_ms: u64,
}

fn default_feedback_toast() -> u64 {
    1500
}

impl Default for CommandSettings {
    fn default() -> Self {
        CommandSettings {
            feedback_toast_ms: default_feedback_toast(),
        }
    }
}

/// Device health policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Free heap at or below which the view is reloaded.
    #[serde(default = "default_distress_threshold")]
    pub distress_threshold: f64,
}

fn default_distress_threshold() -> f64 {
    DEFAULT_DISTRESS_THRESHOLD
}

impl Default for HealthSettings {
    fn default() -> Self {
        HealthSettings {
            distress_threshold: default_distress_threshold(),
        }
    }
}

/// Local clock display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ClockSettings {
    fn default() -> Self {
        ClockSettings { enabled: true }
    }
}

// =============================================================================
// Main Link Configuration
// =============================================================================

/// Complete link configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub feed: FeedSettings,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub push: PushSettings,

    #[serde(default)]
    pub command: CommandSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub clock: ClockSettings,

    /// Slot key layout of the view.
    #[serde(default)]
    pub slots: SlotKeys,
}

impl LinkConfig {
    /// A default config pointing at `host`.
    pub fn for_host(host: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.device.host = host.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (link.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LinkResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading link config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load link config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LinkResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| LinkError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LinkError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| LinkError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Link config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LinkResult<()> {
        if self.device.host.trim().is_empty() {
            return Err(LinkError::InvalidConfig("device.host must not be empty".into()));
        }

        if !self.device.push_path.starts_with('/') {
            return Err(LinkError::InvalidConfig(format!(
                "device.push_path must start with '/', got: {}",
                self.device.push_path
            )));
        }

        // Both URLs must be buildable from the host.
        self.http_base()?;
        self.push_url()?;

        if self.poll.interval_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "poll.interval_ms must be greater than 0".into(),
            ));
        }

        if self.reconnect_delay_ms() == 0 {
            return Err(LinkError::InvalidConfig(
                "push.reconnect_delay_ms must be greater than 0".into(),
            ));
        }

        if self.push.connect_timeout_secs == 0 {
            return Err(LinkError::InvalidConfig(
                "push.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        DistressPolicy::new(self.health.distress_threshold)?;
        self.slots.validate()?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MICROBOX_HOST") {
            debug!(host = %host, "Overriding device host from environment");
            self.device.host = host;
        }

        if let Ok(feed) = std::env::var("MICROBOX_FEED") {
            match feed.parse() {
                Ok(profile) => {
                    debug!(feed = %feed, "Overriding feed profile from environment");
                    self.feed.profile = profile;
                }
                Err(_) => warn!(feed = %feed, "Unknown feed profile in environment"),
            }
        }

        if let Ok(interval) = std::env::var("MICROBOX_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                self.poll.interval_ms = ms;
            }
        }

        if let Ok(delay) = std::env::var("MICROBOX_RECONNECT_DELAY_MS") {
            if let Ok(ms) = delay.parse::<u64>() {
                self.push.reconnect_delay_ms = Some(ms);
            }
        }

        if let Ok(threshold) = std::env::var("MICROBOX_DISTRESS_THRESHOLD") {
            if let Ok(t) = threshold.parse::<f64>() {
                debug!(threshold = t, "Overriding distress threshold from environment");
                self.health.distress_threshold = t;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "microbox", "microbox")
            .map(|dirs| dirs.config_dir().join("link.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn feed(&self) -> FeedProfile {
        self.feed.profile
    }

    /// Effective reconnect delay (explicit setting or the feed's default).
    pub fn reconnect_delay_ms(&self) -> u64 {
        self.push
            .reconnect_delay_ms
            .unwrap_or_else(|| self.feed.profile.default_reconnect_delay_ms())
    }

    pub fn distress_policy(&self) -> LinkResult<DistressPolicy> {
        Ok(DistressPolicy::new(self.health.distress_threshold)?)
    }

    /// `http://<host>/`, the base every poll and command path joins onto.
    pub fn http_base(&self) -> LinkResult<Url> {
        Ok(Url::parse(&format!("http://{}/", self.device.host.trim()))?)
    }

    /// Full URL of the poll endpoint for the configured feed.
    pub fn poll_url(&self) -> LinkResult<Url> {
        Ok(self.http_base()?.join(self.feed.profile.poll_path())?)
    }

    /// `ws://<host><push_path>`.
    pub fn push_url(&self) -> LinkResult<Url> {
        let base = Url::parse(&format!("ws://{}/", self.device.host.trim()))?;
        Ok(base.join(&self.device.push_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_profile_parsing() {
        assert_eq!(
            "data_server".parse::<FeedProfile>().unwrap(),
            FeedProfile::DataServer
        );
        assert_eq!(
            "data-server".parse::<FeedProfile>().unwrap(),
            FeedProfile::DataServer
        );
        assert_eq!("Datetime".parse::<FeedProfile>().unwrap(), FeedProfile::Datetime);
        assert!("weather".parse::<FeedProfile>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.feed(), FeedProfile::DataServer);
        assert_eq!(config.poll.interval_ms, 1500);
        assert_eq!(config.reconnect_delay_ms(), 5000);
        assert_eq!(config.push.growth, ReconnectGrowth::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_datetime_feed_reconnects_faster() {
        let mut config = LinkConfig::default();
        config.feed.profile = FeedProfile::Datetime;
        assert_eq!(config.reconnect_delay_ms(), 3000);

        config.push.reconnect_delay_ms = Some(750);
        assert_eq!(config.reconnect_delay_ms(), 750);
    }

    #[test]
    fn test_urls() {
        let mut config = LinkConfig::for_host("10.0.0.7:8080");
        assert_eq!(
            config.poll_url().unwrap().as_str(),
            "http://10.0.0.7:8080/data-server"
        );
        assert_eq!(config.push_url().unwrap().as_str(), "ws://10.0.0.7:8080/ws");

        config.feed.profile = FeedProfile::Datetime;
        assert_eq!(config.poll_url().unwrap().path(), "/datetime");
    }

    #[test]
    fn test_config_validation() {
        let mut config = LinkConfig::default();
        assert!(config.validate().is_ok());

        config.device.host = "  ".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.device.host = "192.168.4.1".into();
        config.poll.interval_ms = 0;
        assert!(config.validate().is_err());

        config.poll.interval_ms = 1500;
        config.health.distress_threshold = f64::NAN;
        assert!(config.validate().is_err());

        config.health.distress_threshold = 20.0;
        config.slots.humidity = config.slots.temperature.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LinkConfig = toml::from_str(
            r#"
            [device]
            host = "microbox.local"

            [push]
            growth = "exponential"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.host, "microbox.local");
        assert_eq!(config.device.push_path, "/ws");
        assert_eq!(config.push.growth, ReconnectGrowth::Exponential);
        assert_eq!(config.poll.interval_ms, 1500);
        assert_eq!(config.slots.temperature, "server-temp");
    }

    #[test]
    fn test_toml_serialization() {
        let config = LinkConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[poll]"));
        assert!(toml_str.contains("[health]"));
    }
}
