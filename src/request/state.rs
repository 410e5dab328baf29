use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;

use crate::engine::{PeerHandle, TransportEngine, UploadChunk};
use crate::error::StateError;
use crate::request::{Priority, RequestCallbacks, Shared};
use crate::request::headers::Headers;
use crate::request::outcome::RequestOutcome;

pub(crate) type UploadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Lifecycle of a request as observed by callers.
///
/// ```text
///   NotStarted --start()--> Started --finish--> Finished --teardown--> Recycled
/// ```
///
/// `Canceled` is reported while a canceled request has not yet finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Started,
    Canceled,
    Finished,
    Recycled,
}

/// Response content metadata, filled in when the response starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMetadata {
    pub content_type: Option<String>,
    /// As reported by the server; -1 when unknown. Never corrected.
    pub content_length: i64,
}

impl Default for ContentMetadata {
    fn default() -> Self {
        Self {
            content_type: None,
            content_length: -1,
        }
    }
}

/// Exclusive owner of an engine peer. Dropping it destroys the peer.
pub(crate) struct NativePeer {
    handle: PeerHandle,
    engine: Arc<dyn TransportEngine>,
}

impl NativePeer {
    pub(crate) fn create(
        engine: Arc<dyn TransportEngine>,
        url: &str,
        priority: Priority,
        callbacks: RequestCallbacks,
    ) -> Self {
        let handle = engine.create_peer(url, priority, callbacks);
        tracing::trace!(
            peer = handle.as_raw(),
            url = %url,
            priority = priority.as_i32(),
            "Created native peer"
        );
        Self { handle, engine }
    }

    pub(crate) fn add_header(&self, name: &str, value: &str) {
        self.engine.add_header(self.handle, name, value);
    }

    pub(crate) fn set_upload_data(&self, content_type: Option<&str>, data: Bytes) {
        self.engine.set_upload_data(self.handle, content_type, data);
    }

    pub(crate) fn begin_chunked_upload(&self, content_type: Option<&str>) {
        self.engine.begin_chunked_upload(self.handle, content_type);
    }

    pub(crate) fn append_chunk(&self, chunk: UploadChunk) {
        self.engine.append_chunk(self.handle, chunk);
    }

    pub(crate) fn start(&self) {
        self.engine.start(self.handle);
    }

    pub(crate) fn cancel(&self) {
        self.engine.cancel(self.handle);
    }

    pub(crate) fn error_code(&self) -> i32 {
        self.engine.error_code(self.handle)
    }

    pub(crate) fn error_string(&self) -> String {
        self.engine.error_string(self.handle)
    }

    pub(crate) fn http_status_code(&self) -> u16 {
        self.engine.http_status_code(self.handle)
    }

    pub(crate) fn content_metadata(&self) -> ContentMetadata {
        ContentMetadata {
            content_type: self.engine.content_type(self.handle),
            content_length: self.engine.content_length(self.handle),
        }
    }
}

impl Drop for NativePeer {
    fn drop(&mut self) {
        tracing::trace!(peer = self.handle.as_raw(), "Destroying native peer");
        self.engine.destroy_peer(self.handle);
    }
}

/// Everything guarded by the request lock.
pub(crate) struct RequestState {
    /// `None` once the request is recycled.
    pub(crate) peer: Option<NativePeer>,
    pub(crate) additional_headers: Headers,
    pub(crate) upload_attached: bool,
    pub(crate) upload_stream: Option<UploadStream>,
    pub(crate) append_permits: Option<Arc<Semaphore>>,
    /// First local I/O failure; takes precedence over engine error codes.
    pub(crate) local_error: Option<Arc<io::Error>>,
    pub(crate) started: bool,
    pub(crate) canceled: bool,
    pub(crate) finished: bool,
    pub(crate) content: ContentMetadata,
    pub(crate) outcome: Option<RequestOutcome>,
    /// Keeps a started request alive until the engine delivers `Finish`,
    /// even if every caller handle is gone.
    pub(crate) in_flight: Option<Arc<Shared>>,
}

impl RequestState {
    pub(crate) fn new(peer: NativePeer) -> Self {
        Self {
            peer: Some(peer),
            additional_headers: Headers::new(),
            upload_attached: false,
            upload_stream: None,
            append_permits: None,
            local_error: None,
            started: false,
            canceled: false,
            finished: false,
            content: ContentMetadata::default(),
            outcome: None,
            in_flight: None,
        }
    }

    pub(crate) fn is_recycled(&self) -> bool {
        self.peer.is_none()
    }

    pub(crate) fn lifecycle(&self) -> LifecycleState {
        if self.is_recycled() {
            LifecycleState::Recycled
        } else if self.finished {
            LifecycleState::Finished
        } else if self.canceled {
            LifecycleState::Canceled
        } else if self.started {
            LifecycleState::Started
        } else {
            LifecycleState::NotStarted
        }
    }

    /// The peer, as long as the request has not been recycled.
    pub(crate) fn live_peer(&self) -> Result<&NativePeer, StateError> {
        self.peer.as_ref().ok_or(StateError::Recycled)
    }

    pub(crate) fn ensure_not_started(&self) -> Result<(), StateError> {
        if self.started {
            return Err(StateError::AlreadyStarted);
        }
        Ok(())
    }

    pub(crate) fn ensure_not_recycled(&self) -> Result<(), StateError> {
        if self.is_recycled() {
            return Err(StateError::Recycled);
        }
        Ok(())
    }

    pub(crate) fn ensure_upload_not_set(&self) -> Result<(), StateError> {
        if self.upload_attached {
            return Err(StateError::UploadAlreadySet);
        }
        Ok(())
    }

    /// Keeps the first local failure and reports whether `error` was kept.
    pub(crate) fn record_local_error(&mut self, error: io::Error) -> bool {
        if self.local_error.is_some() {
            tracing::debug!(error = %error, "Dropping secondary local I/O error");
            return false;
        }
        self.local_error = Some(Arc::new(error));
        true
    }

    /// Sets the sticky cancel flag and forwards it to a live peer.
    /// Returns false if the request was already canceled.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.canceled {
            return false;
        }
        self.canceled = true;
        if let Some(peer) = &self.peer {
            peer.cancel();
        }
        true
    }
}
