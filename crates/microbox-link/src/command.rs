//! # Command Channel
//!
//! Fire-and-forget user commands with conflict-aware outcome reporting.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  send(request)                                                          │
//! │                                                                         │
//! │   observer.dispatched(request)        optimistic feedback               │
//! │   abort pending request (if any)      at most one in flight             │
//! │   GET /check?pinout=..&state=..  (or /auto-watering, /manual-watering)  │
//! │                                                                         │
//! │   200        ──► nothing; new state arrives via poll / push            │
//! │   400        ──► observer.policy_conflict(request)                      │
//! │   other/err  ──► observer.transport_failure(request, error)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use microbox_core::CommandRequest;

use crate::collaborators::CommandObserver;
use crate::error::{LinkError, LinkResult};
use crate::inflight::RequestSlot;
use crate::protocol::command_url;

/// Counters for one command channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub sent: u64,
    /// Requests aborted because a newer one was issued.
    pub superseded: u64,
}

pub struct CommandChannel {
    client: reqwest::Client,
    base: Url,
    observer: Arc<dyn CommandObserver>,
    in_flight: RequestSlot,
    sent: AtomicU64,
    superseded: AtomicU64,
}

impl CommandChannel {
    /// `base` is the device root, e.g. `http://192.168.4.1/`.
    pub fn new(client: reqwest::Client, base: Url, observer: Arc<dyn CommandObserver>) -> Self {
        CommandChannel {
            client,
            base,
            observer,
            in_flight: RequestSlot::new(),
            sent: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    /// Issues `request`, cancelling any command still in flight.
    ///
    /// Never fails from the caller's point of view: every outcome goes to the
    /// observer.
    pub fn send(&self, request: CommandRequest) {
        let request_id = Uuid::new_v4();

        let url = match command_url(&self.base, &request) {
            Ok(url) => url,
            Err(e) => {
                self.observer.transport_failure(&request, &e);
                return;
            }
        };

        self.observer.dispatched(&request);
        self.sent.fetch_add(1, Ordering::Relaxed);
        debug!(%request_id, kind = %request.resource_kind, target = %request.target_id,
            state = request.desired_state, "Sending command");

        let client = self.client.clone();
        let observer = self.observer.clone();
        let superseded = self.in_flight.reissue(async move {
            match execute(&client, url, &request.target_id).await {
                Ok(()) => debug!(%request_id, "Command accepted"),
                Err(e) if e.is_policy_conflict() => {
                    debug!(%request_id, "Command refused by device policy");
                    observer.policy_conflict(&request);
                }
                Err(e) => observer.transport_failure(&request, &e),
            }
        });

        if superseded {
            self.superseded.fetch_add(1, Ordering::Relaxed);
            debug!(%request_id, "Previous command cancelled");
        }
    }

    /// Aborts the pending command, if any. Its outcome is never reported.
    pub fn cancel(&self) -> bool {
        self.in_flight.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_pending()
    }

    pub fn stats(&self) -> CommandStats {
        CommandStats {
            sent: self.sent.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}

async fn execute(client: &reqwest::Client, url: Url, target: &str) -> LinkResult<()> {
    let endpoint = url.path().to_string();
    let response = client.get(url).send().await?;

    match response.status().as_u16() {
        200 => Ok(()),
        400 => Err(LinkError::PolicyConflict {
            target: target.to_string(),
        }),
        status => Err(LinkError::HttpStatus { endpoint, status }),
    }
}
