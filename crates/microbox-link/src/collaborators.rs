//! # Collaborators
//!
//! The narrow interfaces the link talks to outside itself.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Collaborator Seams                              │
//! │                                                                         │
//! │  Diagnostics      error(context, detail) / warning(context, detail)     │
//! │                   every swallowed failure ends up here                  │
//! │                                                                         │
//! │  Notifier         notify(Info|Warning, message, auto_dismiss?)          │
//! │                   user-facing toasts                                    │
//! │                                                                         │
//! │  CommandObserver  dispatched / policy_conflict / transport_failure      │
//! │                   outcome of each command request                       │
//! │                                                                         │
//! │  ViewSink         (microbox-core) slots + full reload                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

use microbox_core::{CommandRequest, ResourceKind};

use crate::error::LinkError;

// =============================================================================
// Diagnostics
// =============================================================================

/// Sink for failures the channels swallow.
pub trait Diagnostics: Send + Sync {
    fn error(&self, context: &str, detail: &str);
    fn warning(&self, context: &str, detail: &str);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn error(&self, context: &str, detail: &str) {
        error!(context, detail, "Link error");
    }

    fn warning(&self, context: &str, detail: &str) {
        warn!(context, detail, "Link warning");
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Kind of user notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
}

impl std::fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeKind::Info => write!(f, "info"),
            NoticeKind::Warning => write!(f, "warning"),
        }
    }
}

/// User-facing notification surface.
pub trait Notifier: Send + Sync {
    /// Shows `message`. `auto_dismiss` of `None` keeps it until dismissed.
    fn notify(&self, kind: NoticeKind, message: &str, auto_dismiss: Option<Duration>);
}

/// Logs notices instead of showing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str, auto_dismiss: Option<Duration>) {
        let dismiss_ms = auto_dismiss.map(|d| d.as_millis() as u64);
        match kind {
            NoticeKind::Info => info!(notice = message, ?dismiss_ms, "Notice"),
            NoticeKind::Warning => warn!(notice = message, ?dismiss_ms, "Notice"),
        }
    }
}

/// Notifier that drops everything.
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _kind: NoticeKind, _message: &str, _auto_dismiss: Option<Duration>) {}
}

// =============================================================================
// Command Observer
// =============================================================================

/// Receives the outcome of each command request.
///
/// Success is silent: the new state arrives through the poll and push
/// channels, never through the command response.
pub trait CommandObserver: Send + Sync {
    /// Called once per `send`, before the request is issued.
    fn dispatched(&self, _request: &CommandRequest) {}

    /// The device answered 400: an automatic policy owns the resource.
    fn policy_conflict(&self, request: &CommandRequest);

    /// Any other non-200 status or a network error.
    fn transport_failure(&self, request: &CommandRequest, error: &LinkError);
}

/// Default command observer: toasts for the user, diagnostics for failures.
pub struct NotifyingObserver {
    notifier: Arc<dyn Notifier>,
    diagnostics: Arc<dyn Diagnostics>,
    feedback_toast: Duration,
}

/// Notice shown when the device refuses a manual change.
pub const POLICY_CONFLICT_NOTICE: &str = "Auto Watering is Enabled";

impl NotifyingObserver {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        diagnostics: Arc<dyn Diagnostics>,
        feedback_toast: Duration,
    ) -> Self {
        NotifyingObserver {
            notifier,
            diagnostics,
            feedback_toast,
        }
    }
}

impl CommandObserver for NotifyingObserver {
    fn dispatched(&self, request: &CommandRequest) {
        // Optimistic: shown before the device confirms.
        if request.resource_kind == ResourceKind::AutoWateringPolicy {
            let label = if request.desired_state {
                "Enabled"
            } else {
                "Disabled"
            };
            self.notifier.notify(
                NoticeKind::Info,
                &format!("Auto Watering: {}", label),
                Some(self.feedback_toast),
            );
        }
    }

    fn policy_conflict(&self, _request: &CommandRequest) {
        self.notifier
            .notify(NoticeKind::Info, POLICY_CONFLICT_NOTICE, None);
    }

    fn transport_failure(&self, request: &CommandRequest, error: &LinkError) {
        self.diagnostics.error(
            &format!("command {} {}", request.resource_kind, request.target_id),
            &error.to_string(),
        );
    }
}

// =============================================================================
// Recording Collaborators
// =============================================================================

/// Diagnostics captured in memory.
#[derive(Default)]
pub struct RecordingDiagnostics {
    errors: Mutex<Vec<(String, String)>>,
    warnings: Mutex<Vec<(String, String)>>,
}

impl RecordingDiagnostics {
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<(String, String)> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn error(&self, context: &str, detail: &str) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context.to_string(), detail.to_string()));
    }

    fn warning(&self, context: &str, detail: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context.to_string(), detail.to_string()));
    }
}

/// A notice as it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub auto_dismiss: Option<Duration>,
}

/// Notifier capturing every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str, auto_dismiss: Option<Duration>) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Notice {
                kind,
                message: message.to_string(),
                auto_dismiss,
            });
    }
}

/// What a [`RecordingObserver`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Dispatched(CommandRequest),
    PolicyConflict(CommandRequest),
    TransportFailure(CommandRequest),
}

/// Command observer capturing every signal in order.
#[derive(Default)]
pub struct RecordingObserver {
    outcomes: Mutex<Vec<CommandOutcome>>,
}

impl RecordingObserver {
    pub fn outcomes(&self) -> Vec<CommandOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn policy_conflicts(&self) -> usize {
        self.count(|o| matches!(o, CommandOutcome::PolicyConflict(_)))
    }

    pub fn transport_failures(&self) -> usize {
        self.count(|o| matches!(o, CommandOutcome::TransportFailure(_)))
    }

    fn count(&self, pred: impl Fn(&CommandOutcome) -> bool) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|o| pred(o))
            .count()
    }

    fn push(&self, outcome: CommandOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }
}

impl CommandObserver for RecordingObserver {
    fn dispatched(&self, request: &CommandRequest) {
        self.push(CommandOutcome::Dispatched(request.clone()));
    }

    fn policy_conflict(&self, request: &CommandRequest) {
        self.push(CommandOutcome::PolicyConflict(request.clone()));
    }

    fn transport_failure(&self, request: &CommandRequest, _error: &LinkError) {
        self.push(CommandOutcome::TransportFailure(request.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> (Arc<RecordingNotifier>, Arc<RecordingDiagnostics>, NotifyingObserver) {
        let notifier = Arc::new(RecordingNotifier::default());
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let observer = NotifyingObserver::new(
            notifier.clone(),
            diagnostics.clone(),
            Duration::from_millis(1500),
        );
        (notifier, diagnostics, observer)
    }

    #[test]
    fn test_auto_watering_toast_is_optimistic() {
        let (notifier, _, observer) = observer();

        observer.dispatched(&CommandRequest::auto_watering(true));
        observer.dispatched(&CommandRequest::auto_watering(false));
        observer.dispatched(&CommandRequest::relay("relay1", true).unwrap());

        let notices = notifier.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].message, "Auto Watering: Enabled");
        assert_eq!(notices[0].kind, NoticeKind::Info);
        assert_eq!(notices[0].auto_dismiss, Some(Duration::from_millis(1500)));
        assert_eq!(notices[1].message, "Auto Watering: Disabled");
    }

    #[test]
    fn test_policy_conflict_is_informational() {
        let (notifier, diagnostics, observer) = observer();

        observer.policy_conflict(&CommandRequest::manual_watering(true));

        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Info);
        assert_eq!(notices[0].message, POLICY_CONFLICT_NOTICE);
        assert_eq!(notices[0].auto_dismiss, None);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn test_transport_failure_goes_to_diagnostics() {
        let (notifier, diagnostics, observer) = observer();

        observer.transport_failure(
            &CommandRequest::relay("relay2", false).unwrap(),
            &LinkError::HttpStatus {
                endpoint: "/check".into(),
                status: 500,
            },
        );

        assert!(notifier.notices().is_empty());
        let errors = diagnostics.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("relay2"));
        assert!(errors[0].1.contains("500"));
    }
}
