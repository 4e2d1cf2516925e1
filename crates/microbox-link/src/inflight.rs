//! # In-Flight Request Slot
//!
//! Holds at most one outstanding request task. Issuing a new one aborts the
//! previous one first, so a stale response can never land after a fresher
//! request was made.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::AbortHandle;

#[derive(Default)]
pub struct RequestSlot {
    current: Mutex<Option<AbortHandle>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the pending request (if any) and spawns `request` in its place.
    ///
    /// Returns `true` if a still-running request was superseded.
    pub fn reissue<F>(&self, request: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let superseded = Self::abort(current.take());
        *current = Some(tokio::spawn(request).abort_handle());
        superseded
    }

    /// Aborts the pending request. Returns `true` if one was still running.
    pub fn cancel(&self) -> bool {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Self::abort(previous)
    }

    pub fn is_pending(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    fn abort(handle: Option<AbortHandle>) -> bool {
        match handle {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reissue_aborts_pending() {
        let slot = RequestSlot::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let c = completed.clone();
        assert!(!slot.reissue(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(slot.is_pending());

        let c = completed.clone();
        assert!(slot.reissue(async move {
            c.fetch_add(10, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 10);
        assert!(!slot.is_pending());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_reports_nothing() {
        let slot = RequestSlot::new();
        slot.reissue(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!slot.cancel());
        assert!(!slot.cancel());
    }
}
