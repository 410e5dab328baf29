//! URL request lifecycle
//!
//! A [`UrlRequest`] owns one transport-engine peer behind a single request
//! lock. Once started it stays alive until the engine delivers `Finish`.

mod callbacks;
pub mod headers;
mod outcome;
mod sink;
pub mod state;
mod upload;

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Semaphore, watch};

use crate::context::RequestContext;
use crate::engine::UploadChunk;
use crate::error::{BuildError, RequestError, StateError, map_error_code, try_map_error_code};
use crate::listener::CompletionRegistry;

pub use callbacks::RequestCallbacks;
pub use headers::Headers;
pub use outcome::RequestOutcome;
pub use state::{ContentMetadata, LifecycleState};

use sink::{ResponseSink, ResponseSinkWriter};
use state::{NativePeer, RequestState};
use upload::ChunkedUploadPump;

/// Request priority, passed through to the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Idle,
    Lowest,
    Low,
    Medium,
    Highest,
}

impl Priority {
    /// Parses a lowercase priority name.
    ///
    /// ```
    /// # use netreq::request::Priority;
    /// assert_eq!(Priority::from_str("low"), Some(Priority::Low));
    /// assert_eq!(Priority::from_str("LOW"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Priority::Idle),
            "lowest" => Some(Priority::Lowest),
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "highest" => Some(Priority::Highest),
            _ => None,
        }
    }

    /// Numeric value used by the engine.
    pub fn as_i32(&self) -> i32 {
        match self {
            Priority::Idle => 0,
            Priority::Lowest => 1,
            Priority::Low => 2,
            Priority::Medium => 3,
            Priority::Highest => 4,
        }
    }
}

/// State shared between the caller-facing handle and engine callbacks.
pub(crate) struct Shared {
    pub(crate) url: String,
    priority: Priority,
    base_headers: Headers,
    chunk_size: usize,
    state: Mutex<RequestState>,
    sink: Mutex<ResponseSinkWriter>,
    listeners: CompletionRegistry,
    done: watch::Sender<bool>,
}

impl Shared {
    /// Hands a chunk to the engine unless the request was canceled or
    /// finished. Returns whether the chunk was submitted.
    pub(crate) async fn submit_chunk(&self, chunk: UploadChunk) -> bool {
        let state = self.state.lock().await;
        if state.canceled || state.finished {
            return false;
        }
        match &state.peer {
            Some(peer) => {
                peer.append_chunk(chunk);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn upload_should_stop(&self) -> bool {
        let state = self.state.lock().await;
        state.canceled || state.finished || state.is_recycled()
    }

    /// Records a local I/O failure and cancels the request.
    pub(crate) async fn abort_with(&self, error: io::Error) {
        let mut state = self.state.lock().await;
        state.record_local_error(error);
        if state.cancel() {
            tracing::debug!(url = %self.url, "Request canceled after local I/O failure");
        }
    }

    async fn cancel(&self) {
        let mut state = self.state.lock().await;
        if state.cancel() {
            tracing::debug!(url = %self.url, "Request canceled");
        }
    }

    fn exception_of(&self, state: &RequestState) -> Result<Option<RequestError>, StateError> {
        if let Some(error) = &state.local_error {
            return Ok(Some(RequestError::Io(error.clone())));
        }
        let peer = state.live_peer()?;
        Ok(map_error_code(peer.error_code(), &self.url, || peer.error_string()))
    }

    /// Error recorded in the outcome snapshot. Never panics, so teardown
    /// always completes.
    fn outcome_error_of(&self, state: &RequestState) -> Option<RequestError> {
        if let Some(error) = &state.local_error {
            return Some(RequestError::Io(error.clone()));
        }
        let peer = state.peer.as_ref()?;
        match try_map_error_code(peer.error_code(), &self.url, || peer.error_string()) {
            Ok(error) => error,
            Err(code) => {
                tracing::error!(url = %self.url, code, "Engine reported unrecognized error code");
                Some(RequestError::Unrecognized(code))
            }
        }
    }

    pub(crate) async fn on_response_started(&self) {
        let mut state = self.state.lock().await;
        let Some(peer) = &state.peer else {
            return;
        };
        let content = peer.content_metadata();
        tracing::debug!(
            url = %self.url,
            content_type = ?content.content_type,
            content_length = content.content_length,
            "Response started"
        );
        state.content = content;
    }

    pub(crate) async fn on_bytes_read(&self, buf: &[u8]) {
        tracing::trace!(len = buf.len(), "Response bytes read");
        let result = self.sink.lock().await.write_all(buf).await;
        if let Err(e) = result {
            tracing::warn!(url = %self.url, error = %e, "Writing response sink failed");
            self.abort_with(e).await;
        }
    }

    pub(crate) async fn on_append_chunk_completed(&self) {
        let state = self.state.lock().await;
        if let Some(permits) = &state.append_permits {
            permits.add_permits(1);
        }
    }

    /// Terminal transition. Safe to call more than once.
    pub(crate) async fn finish(&self) {
        let in_flight;
        let outcome = {
            let mut state = self.state.lock().await;
            state.finished = true;
            if let Some(permits) = &state.append_permits {
                permits.add_permits(1);
            }

            if state.is_recycled() {
                return;
            }

            self.sink.lock().await.close().await;

            let error = self.outcome_error_of(&state);
            let http_status = state.peer.as_ref().map_or(0, |p| p.http_status_code());
            let outcome = RequestOutcome {
                url: self.url.clone(),
                http_status,
                content: state.content.clone(),
                error,
                canceled: state.canceled,
            };

            drop(state.peer.take());
            state.upload_stream = None;
            in_flight = state.in_flight.take();
            state.outcome = Some(outcome.clone());
            outcome
        };

        tracing::debug!(
            url = %self.url,
            status = outcome.http_status,
            canceled = outcome.canceled,
            success = outcome.is_success(),
            "Request recycled"
        );

        self.listeners.notify(&outcome).await;
        self.done.send_replace(true);
        drop(in_flight);
    }
}

/// A network request driven by a transport engine.
///
/// Cheap to clone; clones refer to the same request, so one task can cancel
/// while another is inside [`start`](Self::start).
#[derive(Clone)]
pub struct UrlRequest {
    shared: Arc<Shared>,
}

impl UrlRequest {
    pub fn builder() -> UrlRequestBuilder {
        UrlRequestBuilder::new()
    }

    /// Adds a request header, replacing an earlier one of the same name.
    pub async fn add_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StateError> {
        let mut state = self.shared.state.lock().await;
        state.ensure_not_started()?;
        state.additional_headers.insert(name, value);
        Ok(())
    }

    /// Uploads a fixed body.
    pub async fn set_upload_data(
        &self,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Result<(), StateError> {
        let mut state = self.shared.state.lock().await;
        state.ensure_not_started()?;
        state.ensure_upload_not_set()?;
        state.live_peer()?.set_upload_data(content_type, data.into());
        state.upload_attached = true;
        Ok(())
    }

    /// Uploads everything `stream` yields, using chunked transfer. The stream
    /// is read by [`start`](Self::start).
    pub async fn set_upload_channel<R>(
        &self,
        content_type: Option<&str>,
        stream: R,
    ) -> Result<(), StateError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut state = self.shared.state.lock().await;
        state.ensure_not_started()?;
        state.ensure_upload_not_set()?;
        state.live_peer()?.begin_chunked_upload(content_type);
        state.upload_stream = Some(Box::new(stream));
        state.append_permits = Some(Arc::new(Semaphore::new(0)));
        state.upload_attached = true;
        Ok(())
    }

    /// Sends headers and starts the request.
    ///
    /// Does nothing if the request was already canceled. With an upload
    /// stream attached this returns once the stream has been drained, the
    /// request was canceled, or the request finished.
    pub async fn start(&self) -> Result<(), StateError> {
        let upload = {
            let mut state = self.shared.state.lock().await;
            if state.canceled {
                tracing::debug!(url = %self.shared.url, "Start ignored, request canceled");
                return Ok(());
            }

            state.ensure_not_started()?;
            state.ensure_not_recycled()?;

            let headers = self.shared.base_headers.merged(&state.additional_headers);
            let peer = state.live_peer()?;
            for (name, value) in headers.iter() {
                peer.add_header(name, value);
            }

            state.started = true;
            state.live_peer()?.start();
            state.in_flight = Some(self.shared.clone());
            tracing::debug!(
                url = %self.shared.url,
                priority = ?self.shared.priority,
                headers = headers.len(),
                "Request started"
            );

            state.upload_stream.take().zip(state.append_permits.clone())
        };

        // The pump reads outside the lock so engine events keep flowing.
        if let Some((stream, permits)) = upload {
            ChunkedUploadPump::new(&self.shared, permits, self.shared.chunk_size)
                .run(stream)
                .await;
        }

        Ok(())
    }

    /// Cancels the request. Idempotent; never fails.
    pub async fn cancel(&self) {
        self.shared.cancel().await;
    }

    pub async fn is_canceled(&self) -> bool {
        self.shared.state.lock().await.canceled
    }

    pub async fn is_recycled(&self) -> bool {
        self.shared.state.lock().await.is_recycled()
    }

    pub async fn lifecycle(&self) -> LifecycleState {
        self.shared.state.lock().await.lifecycle()
    }

    /// Returns the request's error, or `None` if it succeeded (or has not
    /// failed yet).
    ///
    /// A local sink or upload-source failure always wins over whatever the
    /// engine reports. Otherwise the engine's error code is mapped, which
    /// requires the request not to be recycled; use
    /// [`outcome`](Self::outcome) after completion.
    ///
    /// # Panics
    ///
    /// Panics if the engine reports an error code outside the known set.
    pub async fn exception(&self) -> Result<Option<RequestError>, StateError> {
        let state = self.shared.state.lock().await;
        self.shared.exception_of(&state)
    }

    /// HTTP status reported by the engine, 0 before a response arrived.
    pub async fn http_status_code(&self) -> u16 {
        let state = self.shared.state.lock().await;
        match (&state.peer, &state.outcome) {
            (Some(peer), _) => peer.http_status_code(),
            (None, Some(outcome)) => outcome.http_status,
            (None, None) => 0,
        }
    }

    /// Content length as reported by the server. -1 until the response
    /// starts; may be -1 or wrong afterwards too.
    pub async fn content_length(&self) -> i64 {
        self.shared.state.lock().await.content.content_length
    }

    pub async fn content_type(&self) -> Option<String> {
        self.shared.state.lock().await.content.content_type.clone()
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn priority(&self) -> Priority {
        self.shared.priority
    }

    /// The snapshot taken at teardown, `None` before that.
    pub async fn outcome(&self) -> Option<RequestOutcome> {
        self.shared.state.lock().await.outcome.clone()
    }

    /// Waits until the request has been torn down and returns its outcome.
    pub async fn wait_for_completion(&self) -> RequestOutcome {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = done.wait_for(|finished| *finished).await;

        match self.outcome().await {
            Some(outcome) => outcome,
            None => unreachable!("request marked done without an outcome"),
        }
    }
}

impl std::fmt::Debug for UrlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlRequest")
            .field("url", &self.shared.url)
            .field("priority", &self.shared.priority)
            .finish_non_exhaustive()
    }
}

/// Builder for [`UrlRequest`].
#[derive(Default)]
pub struct UrlRequestBuilder {
    context: Option<RequestContext>,
    url: Option<String>,
    priority: Option<Priority>,
    headers: Headers,
    sink: Option<ResponseSink>,
}

impl UrlRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all base headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Destination for the response body. Defaults to discarding it.
    pub fn sink<W>(mut self, sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Creates the engine peer for the request.
    pub fn build(self) -> Result<UrlRequest, BuildError> {
        let context = self.context.ok_or(BuildError::MissingArgument("context"))?;
        let url = self.url.ok_or(BuildError::MissingArgument("url"))?;
        let priority = self.priority.unwrap_or(context.config().default_priority);
        let sink = self.sink.unwrap_or_else(|| Box::new(tokio::io::sink()));
        let base_headers = self.headers;

        let shared = Arc::new_cyclic(|weak| {
            let callbacks = RequestCallbacks::new(weak.clone());
            let peer = NativePeer::create(context.engine().clone(), &url, priority, callbacks);
            Shared {
                url,
                priority,
                base_headers,
                chunk_size: context.config().upload_chunk_size.max(1),
                state: Mutex::new(RequestState::new(peer)),
                sink: Mutex::new(ResponseSinkWriter::new(sink)),
                listeners: context.listeners().clone(),
                done: watch::channel(false).0,
            }
        });

        Ok(UrlRequest { shared })
    }
}
