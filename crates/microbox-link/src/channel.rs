//! # Channel Types
//!
//! Types shared by the poll and push channels and the core that consumes
//! them.

use microbox_core::Snapshot;

/// Lifecycle state of one channel.
///
/// ```text
///   Idle ──start──► Connecting ──ok──► Open
///                       ▲   │            │
///                       │   └──fail──┐   │ close / error
///                 retry │            ▼   ▼
///                       └────────── Closed
///
///   stop() from any state ──► Idle
/// ```
///
/// For the poll channel `Connecting` means a request is in flight, `Open`
/// that the last cycle succeeded and `Closed` that it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Idle => write!(f, "idle"),
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Open => write!(f, "open"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Which channel produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Poll,
    Push,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Poll => write!(f, "poll"),
            Source::Push => write!(f, "push"),
        }
    }
}

/// A decoded snapshot on its way to the merge.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub source: Source,
    pub snapshot: Snapshot,
}

impl Delivery {
    pub fn new(source: Source, snapshot: Snapshot) -> Self {
        Delivery { source, snapshot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ChannelStatus::default().to_string(), "idle");
        assert_eq!(ChannelStatus::Open.to_string(), "open");
        assert_eq!(Source::Push.to_string(), "push");
    }
}
