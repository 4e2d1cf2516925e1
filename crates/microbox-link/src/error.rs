//! # Link Error Types
//!
//! Error types for the dual-channel link.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Link Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ TransportFailure│  │  ParseFailure   │  │    PolicyConflict       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ ConnectionFailed│  │ InvalidPayload  │  │ 400 on a command: an    │ │
//! │  │ HttpStatus      │  │ Serialization   │  │ automatic policy owns   │ │
//! │  │ Timeout         │  │                 │  │ the resource            │ │
//! │  │ WebSocketError  │  │ logged, message │  │                         │ │
//! │  │ Disconnected    │  │ dropped, channel│  │ shown to the user as    │ │
//! │  │                 │  │ stays open      │  │ information             │ │
//! │  │ logged, retried │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │ ResourceDistress│  │  Configuration  │                              │
//! │  │                 │  │                 │                              │
//! │  │ free heap at or │  │ InvalidConfig   │                              │
//! │  │ below threshold │  │ InvalidUrl      │                              │
//! │  │ → view reload   │  │ ConfigLoad/Save │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these ever escape `start`, `stop` or `send`: channels report them
//! through the collaborators and carry on.

use thiserror::Error;

use microbox_core::CoreError;

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Link error covering every failure a channel can observe.
#[derive(Debug, Error)]
pub enum LinkError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid link configuration.
    #[error("Invalid link configuration: {0}")]
    InvalidConfig(String),

    /// Device endpoint could not be turned into a URL.
    #[error("Invalid device URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Failures
    // =========================================================================
    /// Could not reach the device.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Device answered with something other than 200.
    #[error("Device answered HTTP {status} for {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    /// Push connection dropped.
    #[error("Disconnected from device")]
    Disconnected,

    /// Connect or request timeout.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Parse Failures
    // =========================================================================
    /// Payload was not the JSON shape the device promises.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Failed to serialize an outbound message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Command Outcomes
    // =========================================================================
    /// The device refused a command because an automatic policy owns the
    /// target resource.
    #[error("Policy conflict on {target}: device refused the change")]
    PolicyConflict { target: String },

    // =========================================================================
    // Domain / Internal
    // =========================================================================
    /// Domain rule violation from microbox-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            LinkError::InvalidPayload(err.to_string())
        } else {
            LinkError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for LinkError {
    fn from(err: url::ParseError) -> Self {
        LinkError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LinkError::Timeout(0)
        } else if err.is_decode() {
            LinkError::InvalidPayload(err.to_string())
        } else {
            LinkError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => LinkError::Disconnected,
            WsError::AlreadyClosed => LinkError::Disconnected,
            WsError::Protocol(p) => LinkError::WebSocketError(p.to_string()),
            WsError::Io(io) => LinkError::ConnectionFailed(io.to_string()),
            WsError::Http(response) => LinkError::HttpStatus {
                endpoint: "websocket upgrade".into(),
                status: response.status().as_u16(),
            },
            other => LinkError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for LinkError {
    fn from(err: toml::ser::Error) -> Self {
        LinkError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl LinkError {
    /// Network or status failure: logged, then the normal cadence retries.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectionFailed(_)
                | LinkError::HttpStatus { .. }
                | LinkError::Disconnected
                | LinkError::Timeout(_)
                | LinkError::WebSocketError(_)
        )
    }

    /// Malformed payload: logged and dropped.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, LinkError::InvalidPayload(_))
    }

    pub fn is_policy_conflict(&self) -> bool {
        matches!(self, LinkError::PolicyConflict { .. })
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidConfig(_)
                | LinkError::InvalidUrl(_)
                | LinkError::ConfigLoadFailed(_)
                | LinkError::ConfigSaveFailed(_)
                | LinkError::Core(_)
        )
    }

    /// True if the next poll tick or reconnect may succeed where this failed.
    pub fn is_retryable(&self) -> bool {
        self.is_transport_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_is_disjoint() {
        let transport = LinkError::HttpStatus {
            endpoint: "/data-server".into(),
            status: 500,
        };
        assert!(transport.is_transport_failure());
        assert!(!transport.is_policy_conflict());

        let conflict = LinkError::PolicyConflict {
            target: "relay1".into(),
        };
        assert!(conflict.is_policy_conflict());
        assert!(!conflict.is_transport_failure());
        assert!(!conflict.is_retryable());

        let parse = LinkError::InvalidPayload("eof".into());
        assert!(parse.is_parse_failure());
        assert!(!parse.is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_parse_failure() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(LinkError::from(err).is_parse_failure());
    }

    #[test]
    fn test_error_display() {
        let err = LinkError::HttpStatus {
            endpoint: "/check".into(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("/check"));
    }
}
