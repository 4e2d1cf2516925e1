//! # Channel Registry
//!
//! One poll channel, one push channel and one command channel per process.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ChannelRegistry                                  │
//! │                                                                         │
//! │   poll_channel()    ──► Arc<PollChannel>     created on first call,    │
//! │   push_channel()    ──► Arc<PushChannel>     same instance afterwards  │
//! │   command_channel() ──► Arc<CommandChannel>                             │
//! │                                                                         │
//! │   reset()  stops and forgets all three; the next call builds anew      │
//! │                                                                         │
//! │   Held by the application root and passed down. Repeated view-ready    │
//! │   triggers therefore share channels instead of stacking timers and     │
//! │   connections.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use microbox_core::ElementUpdater;

use crate::agent::StateSyncCore;
use crate::collaborators::{CommandObserver, Diagnostics, Notifier, NotifyingObserver};
use crate::command::CommandChannel;
use crate::config::LinkConfig;
use crate::error::LinkResult;
use crate::poll::PollChannel;
use crate::transport::{PushChannel, PushConfig};

/// The three channel kinds the registry manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Poll,
    Push,
    Command,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Poll => write!(f, "poll"),
            ChannelKind::Push => write!(f, "push"),
            ChannelKind::Command => write!(f, "command"),
        }
    }
}

/// Lifecycle-scoped owner of the process's channels.
///
/// Get-or-create is one typed accessor per kind ([`poll_channel`],
/// [`push_channel`], [`command_channel`]) so callers get the concrete
/// channel back. [`ChannelKind`] names a kind where no channel is wanted,
/// as in [`contains`].
///
/// [`poll_channel`]: ChannelRegistry::poll_channel
/// [`push_channel`]: ChannelRegistry::push_channel
/// [`command_channel`]: ChannelRegistry::command_channel
/// [`contains`]: ChannelRegistry::contains
pub struct ChannelRegistry {
    config: LinkConfig,
    client: reqwest::Client,
    poll_url: Url,
    http_base: Url,
    push_config: PushConfig,
    diagnostics: Arc<dyn Diagnostics>,
    observer: Arc<dyn CommandObserver>,
    poll: Mutex<Option<Arc<PollChannel>>>,
    push: Mutex<Option<Arc<PushChannel>>>,
    command: Mutex<Option<Arc<CommandChannel>>>,
}

impl ChannelRegistry {
    /// Creates a registry whose command outcomes become user notices.
    pub fn new(
        config: LinkConfig,
        diagnostics: Arc<dyn Diagnostics>,
        notifier: Arc<dyn Notifier>,
    ) -> LinkResult<Self> {
        let observer = Arc::new(NotifyingObserver::new(
            notifier,
            diagnostics.clone(),
            Duration::from_millis(config.command.feedback_toast_ms),
        ));
        Self::with_observer(config, diagnostics, observer)
    }

    /// Creates a registry with a custom command observer.
    pub fn with_observer(
        config: LinkConfig,
        diagnostics: Arc<dyn Diagnostics>,
        observer: Arc<dyn CommandObserver>,
    ) -> LinkResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder().build()?;

        Ok(ChannelRegistry {
            poll_url: config.poll_url()?,
            http_base: config.http_base()?,
            push_config: PushConfig::from_link_config(&config)?,
            config,
            client,
            diagnostics,
            observer,
            poll: Mutex::new(None),
            push: Mutex::new(None),
            command: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The poll channel, created on first use.
    pub fn poll_channel(&self) -> Arc<PollChannel> {
        let mut slot = self.poll.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            debug!(url = %self.poll_url, "Creating poll channel");
            Arc::new(PollChannel::new(
                self.client.clone(),
                self.poll_url.clone(),
                self.diagnostics.clone(),
            ))
        })
        .clone()
    }

    /// The push channel, created on first use.
    pub fn push_channel(&self) -> Arc<PushChannel> {
        let mut slot = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            debug!(url = %self.push_config.url, "Creating push channel");
            Arc::new(PushChannel::new(
                self.push_config.clone(),
                self.diagnostics.clone(),
            ))
        })
        .clone()
    }

    /// The command channel, created on first use.
    pub fn command_channel(&self) -> Arc<CommandChannel> {
        let mut slot = self.command.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            debug!(base = %self.http_base, "Creating command channel");
            Arc::new(CommandChannel::new(
                self.client.clone(),
                self.http_base.clone(),
                self.observer.clone(),
            ))
        })
        .clone()
    }

    /// Whether a channel of `kind` currently exists.
    pub fn contains(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Poll => self.poll.lock().unwrap_or_else(PoisonError::into_inner).is_some(),
            ChannelKind::Push => self.push.lock().unwrap_or_else(PoisonError::into_inner).is_some(),
            ChannelKind::Command => self
                .command
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
        }
    }

    /// A core over this registry's poll and push channels.
    pub fn build_core(&self, updater: Arc<ElementUpdater>) -> LinkResult<StateSyncCore> {
        StateSyncCore::builder(updater)
            .poll(self.poll_channel())
            .push(self.push_channel())
            .slot_keys(self.config.slots.clone())
            .distress_policy(self.config.distress_policy()?)
            .diagnostics(self.diagnostics.clone())
            .build()
    }

    /// Stops every channel and forgets it.
    pub async fn reset(&self) {
        let poll = self.poll.lock().unwrap_or_else(PoisonError::into_inner).take();
        let push = self.push.lock().unwrap_or_else(PoisonError::into_inner).take();
        let command = self
            .command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(poll) = poll {
            poll.stop().await;
        }
        if let Some(push) = push {
            push.stop().await;
        }
        if let Some(command) = command {
            command.cancel();
        }

        info!("Channel registry reset");
    }
}
