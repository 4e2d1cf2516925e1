//! # Error Types
//!
//! Domain errors for microbox-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  microbox-core errors (this file)                                      │
//! │  └── CoreError   - bad readings, bad commands, bad slot layouts         │
//! │                                                                         │
//! │  microbox-link errors (separate crate)                                 │
//! │  └── LinkError   - transport, parse, policy conflict, config            │
//! │                                                                         │
//! │  Flow: CoreError → LinkError → Diagnostics / Notifier                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core domain errors.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// A reading could not be interpreted (empty text, non-finite value).
    #[error("Invalid reading: {0:?}")]
    InvalidReading(String),

    /// Unknown command resource kind.
    #[error("Unknown resource kind: '{0}'. Valid options: relay, auto, manual")]
    UnknownResourceKind(String),

    /// A desired state that is not a recognisable on/off value.
    #[error("Invalid desired state: '{0}'. Use on/off, 1/0 or true/false")]
    InvalidDesiredState(String),

    /// A relay command without a target element id.
    #[error("Relay command requires a target id")]
    MissingTarget,

    /// Two logical fields were mapped onto the same presentation slot.
    #[error("Slot key '{0}' is mapped more than once")]
    DuplicateSlotKey(String),

    /// Distress threshold must be a finite, non-negative number.
    #[error("Invalid distress threshold: {0}")]
    InvalidThreshold(f64),
}
