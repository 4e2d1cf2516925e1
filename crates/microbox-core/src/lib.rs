//! # microbox-core: Pure Domain Logic for the MicroBox Link
//!
//! The I/O-free half of the dashboard link. Everything here is deterministic
//! and can be tested without a device on the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MicroBox Link Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   apps/console (terminal view)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              microbox-link (poll / push / command)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Snapshot                               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ microbox-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   slots   │  │  updater  │  │   merge   │  │   │
//! │  │   │ Snapshot  │  │ SlotValue │  │ Element-  │  │ apply +   │  │   │
//! │  │   │ Command-  │  │ SlotKeys  │  │ Updater   │  │ Distress- │  │   │
//! │  │   │ Request   │  │ format_*  │  │ ViewSink  │  │ Policy    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO NETWORK                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Snapshot and command request types
//! - [`slots`] - Slot keys, slot values and value formatting
//! - [`updater`] - `ElementUpdater`, the only writer of presentation slots
//! - [`merge`] - Snapshot merge and the resource-distress policy
//! - [`clock`] - Local wall-clock formatting
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use microbox_core::{apply_snapshot, ElementUpdater, ServerMetrics, SlotKeys, Snapshot};
//! use microbox_core::updater::RecordingView;
//!
//! let view = Arc::new(RecordingView::with_slots(["server-temp", "server-hum"]));
//! let updater = ElementUpdater::new(view.clone());
//!
//! let snapshot = Snapshot::default().with_metrics(ServerMetrics {
//!     temperature: "24.5".parse().ok(),
//!     ..Default::default()
//! });
//! apply_snapshot(&updater, &SlotKeys::default(), &snapshot);
//!
//! assert_eq!(view.text("server-temp").as_deref(), Some("24.5°C"));
//! assert_eq!(view.text("server-hum").as_deref(), Some("N/A"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod merge;
pub mod slots;
pub mod types;
pub mod updater;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use merge::{apply_snapshot, DistressPolicy, MergeReport};
pub use slots::{SlotKeys, SlotValue, PLACEHOLDER};
pub use types::*;
pub use updater::{ElementUpdater, ViewSink};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Free-heap figure at or below which the device is considered in distress.
///
/// Same unit the firmware reports in `heap_memory.free_heap`.
pub const DEFAULT_DISTRESS_THRESHOLD: f64 = 20.0;
