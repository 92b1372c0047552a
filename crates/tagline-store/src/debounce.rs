//! Debounced tag refresh driven by the note-collection size signal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::TagStore;

/// Watches the visible note-collection size and refreshes the tag registry
/// once the size has been stable for a full quiescence window.
///
/// A pure debounce, not a throttle: every observed change cancels the
/// pending timer and starts a new one, so a continuous stream of changes
/// fires nothing until it stops. At most one timer is alive at any moment.
/// Must be used from within a Tokio runtime.
pub struct SyncTrigger {
    store: Arc<TagStore>,
    window: Duration,
    inner: Mutex<TriggerState>,
}

#[derive(Default)]
struct TriggerState {
    last_size: Option<usize>,
    pending: Option<JoinHandle<()>>,
}

impl SyncTrigger {
    pub fn new(store: Arc<TagStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            inner: Mutex::new(TriggerState::default()),
        }
    }

    /// Feed one observation of the note-collection size. A size equal to the
    /// last observed one is ignored; a change (re)starts the quiescence
    /// window.
    pub fn observe(&self, size: usize) {
        let mut inner = self.inner.lock().unwrap();
        if inner.last_size == Some(size) {
            return;
        }
        inner.last_size = Some(size);
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }

        // The window starts when the change is observed, not when the timer
        // task is first polled.
        let deadline = tokio::time::Instant::now() + self.window;
        let store = Arc::clone(&self.store);
        inner.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Refresh failures here never reach the user; the next window
            // simply tries again.
            if let Err(err) = store.fetch(false).await {
                if !err.is_cancelled() {
                    debug!(error = %err, "debounced tag refresh failed");
                }
            }
        }));
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pending) = inner.pending.take() {
            pending.abort();
        }
    }

    /// Whether a quiescence window is currently running.
    pub fn is_pending(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SyncTrigger {
    fn drop(&mut self) {
        self.cancel();
    }
}
