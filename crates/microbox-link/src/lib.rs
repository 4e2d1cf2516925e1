//! # microbox-link: Dual-Channel Sync for the MicroBox Dashboard
//!
//! Keeps a dashboard view in step with a MicroBox controller on the local
//! network, and carries user commands back to it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Link Architecture                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  ChannelRegistry (application root)              │  │
//! │  │       one Poll, one Push, one Command channel per process        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  PollChannel   │  │  PushChannel   │  │   CommandChannel       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ GET full state │  │ WebSocket,     │  │ GET /check, /auto-     │    │
//! │  │ every interval │  │ subscribe on   │  │ watering, /manual-     │    │
//! │  │ one in flight  │  │ open, reconnect│  │ watering; 400 = policy │    │
//! │  └───────┬────────┘  └───────┬────────┘  │ conflict               │    │
//! │          │     Delivery      │           └────────────────────────┘    │
//! │          └─────────┬─────────┘                                          │
//! │                    ▼                                                    │
//! │           ┌─────────────────┐        ┌─────────────────┐              │
//! │           │  StateSyncCore  │───────►│ ElementUpdater  │──► ViewSink  │
//! │           │ merge, distress │        │ (microbox-core) │              │
//! │           └─────────────────┘        └─────────────────┘              │
//! │                                                                         │
//! │  LocalClock writes `time` / `date` every second, independent of the    │
//! │  device.                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`] - `StateSyncCore`, the start/stop surface and merge router
//! - [`poll`] - Interval poller with cancel-before-reissue
//! - [`transport`] - WebSocket push channel with reconnect
//! - [`command`] - User command sender
//! - [`registry`] - Process-wide channel registry
//! - [`protocol`] - Wire shapes and snapshot decoding
//! - [`collaborators`] - Diagnostics, notifier and command observer seams
//! - [`config`] - TOML configuration
//! - [`clock`] - Local clock ticker
//! - [`error`] - Error types
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let config = LinkConfig::load_or_default(None);
//! let registry = ChannelRegistry::new(config, Arc::new(TracingDiagnostics), Arc::new(TracingNotifier))?;
//!
//! let updater = Arc::new(ElementUpdater::new(view));
//! let core = registry.build_core(updater)?;
//! core.start(registry.config().poll.interval());
//!
//! registry.command_channel().send(CommandRequest::relay("relay1", true)?);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod channel;
pub mod clock;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod error;
pub mod inflight;
pub mod poll;
pub mod protocol;
pub mod registry;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{StateSyncCore, StateSyncCoreBuilder, SyncStatus};
pub use channel::{ChannelStatus, Delivery, Source};
pub use clock::LocalClock;
pub use collaborators::{
    CommandObserver, Diagnostics, NoticeKind, Notifier, NotifyingObserver, TracingDiagnostics,
    TracingNotifier,
};
pub use command::{CommandChannel, CommandStats};
pub use config::{FeedProfile, LinkConfig, ReconnectGrowth};
pub use error::{LinkError, LinkResult};
pub use poll::{PollChannel, PollStats};
pub use protocol::{Envelope, SubscribeMessage};
pub use registry::{ChannelKind, ChannelRegistry};
pub use transport::{PushChannel, PushConfig, PushStats};
