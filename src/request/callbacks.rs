use std::sync::Weak;

use crate::engine::EngineEvent;
use crate::request::Shared;

/// Handle through which the transport engine delivers events to one request.
///
/// Holds the request weakly. A started request keeps itself alive until
/// `Finish`, so only events for a dropped, never-started request are discarded.
#[derive(Clone)]
pub struct RequestCallbacks {
    request: Weak<Shared>,
}

impl RequestCallbacks {
    pub(crate) fn new(request: Weak<Shared>) -> Self {
        Self { request }
    }

    /// Delivers one event. Events for the same request must be delivered
    /// one at a time, in engine order.
    pub async fn deliver(&self, event: EngineEvent<'_>) {
        let Some(request) = self.request.upgrade() else {
            tracing::trace!(?event, "Request dropped, discarding engine event");
            return;
        };

        match event {
            EngineEvent::ResponseStarted => request.on_response_started().await,
            EngineEvent::BytesRead(buf) => request.on_bytes_read(buf).await,
            EngineEvent::AppendChunkCompleted => request.on_append_chunk_completed().await,
            EngineEvent::Finish => request.finish().await,
        }
    }

    /// Whether the request this handle points at is still alive.
    pub fn is_attached(&self) -> bool {
        self.request.strong_count() > 0
    }
}

impl std::fmt::Debug for RequestCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCallbacks")
            .field("attached", &self.is_attached())
            .finish()
    }
}
