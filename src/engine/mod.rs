//! Transport engine boundary.
//!
//! The engine performs the actual network I/O. A request only ever talks to
//! it through a [`PeerHandle`] and the synchronous calls of
//! [`TransportEngine`]; the engine talks back by delivering [`EngineEvent`]s
//! through the [`RequestCallbacks`] it was given when the peer was created.
//!
//! # Event ordering
//!
//! For a started request the engine delivers, in order:
//!
//! ```text
//!   ResponseStarted         at most once
//!   BytesRead(..)           zero or more
//!   AppendChunkCompleted    zero or more, interleaved
//!   Finish                  exactly once
//! ```
//!
//! Cancellation may cut the sequence short, but `Finish` always arrives.
//! No event is delivered before `start`, except that canceling a peer that
//! never started may still produce `Finish`.

pub mod loopback;

use bytes::Bytes;

use crate::request::Priority;

pub use crate::request::RequestCallbacks;

/// Opaque identifier of engine-side request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(u64);

impl PeerHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// One piece of a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    pub data: Bytes,
    /// Set on the final chunk of the upload and on no other.
    pub is_last: bool,
}

/// Callback delivered by the engine into a request.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// Response headers are available; content metadata can be queried.
    ResponseStarted,
    /// A slice of the response body. The slice is only valid for the
    /// duration of the delivery.
    BytesRead(&'a [u8]),
    /// The engine is done with the last chunk handed to `append_chunk`.
    AppendChunkCompleted,
    /// The request is fully resolved, successfully or not.
    Finish,
}

/// Calls a request makes into the transport engine.
///
/// Every method must return promptly; anything slow happens on the engine's
/// own tasks and is reported back through [`RequestCallbacks`].
pub trait TransportEngine: Send + Sync {
    fn create_peer(&self, url: &str, priority: Priority, callbacks: RequestCallbacks) -> PeerHandle;

    fn add_header(&self, peer: PeerHandle, name: &str, value: &str);

    fn set_upload_data(&self, peer: PeerHandle, content_type: Option<&str>, data: Bytes);

    fn begin_chunked_upload(&self, peer: PeerHandle, content_type: Option<&str>);

    /// Queues one chunk. The engine acknowledges it with
    /// [`EngineEvent::AppendChunkCompleted`].
    fn append_chunk(&self, peer: PeerHandle, chunk: UploadChunk);

    fn start(&self, peer: PeerHandle);

    fn cancel(&self, peer: PeerHandle);

    /// Releases engine-side state. Called exactly once per peer.
    fn destroy_peer(&self, peer: PeerHandle);

    fn error_code(&self, peer: PeerHandle) -> i32;

    fn http_status_code(&self, peer: PeerHandle) -> u16;

    fn error_string(&self, peer: PeerHandle) -> String;

    fn content_type(&self, peer: PeerHandle) -> Option<String>;

    /// Content length as reported by the server; may be -1 or simply wrong.
    fn content_length(&self, peer: PeerHandle) -> i64;
}
