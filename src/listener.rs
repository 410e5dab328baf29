//! Completion notification
//!
//! Listeners are registered on an explicitly constructed
//! [`CompletionRegistry`] that is handed to a `RequestContext`; every request
//! created from that context notifies the registry once it is torn down.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::request::RequestOutcome;

/// Receives the outcome of every completed request.
pub trait CompletionListener: Send + Sync {
    fn on_request_complete(&self, outcome: &RequestOutcome);
}

impl<F> CompletionListener for F
where
    F: Fn(&RequestOutcome) + Send + Sync,
{
    fn on_request_complete(&self, outcome: &RequestOutcome) {
        self(outcome)
    }
}

/// Shared list of completion listeners. Clones refer to the same list.
#[derive(Clone, Default)]
pub struct CompletionRegistry {
    listeners: Arc<RwLock<Vec<Arc<dyn CompletionListener>>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, listener: Arc<dyn CompletionListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Removes every registration of `listener`. Returns how many were removed.
    pub async fn unregister(&self, listener: &Arc<dyn CompletionListener>) -> usize {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        before - listeners.len()
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.read().await.is_empty()
    }

    /// Calls every listener in registration order.
    pub async fn notify(&self, outcome: &RequestOutcome) {
        // Snapshot so a listener may register others without deadlocking.
        let listeners = self.listeners.read().await.clone();
        tracing::trace!(listeners = listeners.len(), url = %outcome.url, "Notifying completion listeners");
        for listener in listeners {
            listener.on_request_complete(outcome);
        }
    }
}

impl std::fmt::Debug for CompletionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRegistry").finish_non_exhaustive()
    }
}
