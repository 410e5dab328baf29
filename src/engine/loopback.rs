//! In-process transport engine that answers every request with its own body.
//!
//! Each peer gets a driver task that delivers events strictly in order. The
//! response is the uploaded body (fixed or chunked, once the last chunk
//! arrived), handed to the request in `read_size` pieces. [`Behavior`]
//! scripts failures and misreported metadata; every engine call is recorded
//! and can be inspected with [`LoopbackEngine::calls`].
//!
//! Creating a peer spawns a task, so requests must be built inside a tokio
//! runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::config::DEFAULT_RESPONSE_READ_SIZE;
use crate::engine::{EngineEvent, PeerHandle, RequestCallbacks, TransportEngine, UploadChunk};
use crate::error::ErrorCode;
use crate::request::Priority;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const ABORTED: &str = "net::ERR_ABORTED";
const UPLOAD_REJECTED: &str = "net::ERR_CONNECTION_RESET";

/// How the loopback engine answers.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Fail every request with this code and message instead of answering.
    pub error: Option<(ErrorCode, String)>,
    pub http_status: u16,
    /// Reported instead of the real body length.
    pub content_length: Option<i64>,
    /// Answer with this body instead of echoing the upload.
    pub response_body: Option<Bytes>,
    /// When false, appended chunks are never acknowledged.
    pub acknowledge_chunks: bool,
    /// Reset the connection once this many chunks arrived, like a server
    /// rejecting an upload midway.
    pub reject_upload_after: Option<usize>,
    pub read_size: usize,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            error: None,
            http_status: 200,
            content_length: None,
            response_body: None,
            acknowledge_chunks: true,
            reject_upload_after: None,
            read_size: DEFAULT_RESPONSE_READ_SIZE,
        }
    }
}

impl Behavior {
    pub fn failing(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: Some((code, message.into())),
            ..Self::default()
        }
    }
}

/// A call made into the engine, as recorded by [`LoopbackEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreatePeer { url: String, priority: Priority },
    AddHeader { name: String, value: String },
    SetUploadData { content_type: Option<String>, len: usize },
    BeginChunkedUpload { content_type: Option<String> },
    AppendChunk { len: usize, is_last: bool },
    Start,
    Cancel,
    DestroyPeer,
}

enum Delivery {
    ChunkAck,
    Respond(Bytes),
    Finish,
}

enum Upload {
    None,
    Fixed(Bytes),
    Chunked {
        received: BytesMut,
        chunks: usize,
        complete: bool,
    },
}

struct Peer {
    events: mpsc::UnboundedSender<Delivery>,
    upload: Upload,
    upload_type: Option<String>,
    started: bool,
    canceled: bool,
    finish_queued: bool,
    error_code: ErrorCode,
    error_string: String,
    http_status: u16,
    content_type: Option<String>,
    content_length: i64,
}

impl Peer {
    fn queue(&self, delivery: Delivery) {
        // The driver only goes away after delivering Finish.
        let _ = self.events.send(delivery);
    }

    fn finish_with(&mut self, code: ErrorCode, message: &str) {
        if self.finish_queued {
            return;
        }
        self.finish_queued = true;
        self.error_code = code;
        self.error_string = message.to_string();
        self.queue(Delivery::Finish);
    }

    /// Answers once the request started and its body is complete.
    fn respond_if_ready(&mut self, behavior: &Behavior) {
        if !self.started || self.finish_queued {
            return;
        }

        let body = match &mut self.upload {
            Upload::None => Bytes::new(),
            Upload::Fixed(data) => data.clone(),
            Upload::Chunked { complete: false, .. } => return,
            Upload::Chunked { received, .. } => received.split().freeze(),
        };

        if let Some((code, message)) = &behavior.error {
            self.finish_with(*code, message);
            return;
        }

        let body = behavior.response_body.clone().unwrap_or(body);
        self.http_status = behavior.http_status;
        self.content_type = Some(
            self.upload_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        );
        self.content_length = behavior.content_length.unwrap_or(body.len() as i64);
        self.finish_queued = true;
        self.queue(Delivery::Respond(body));
    }
}

struct Inner {
    behavior: Behavior,
    next_id: AtomicU64,
    peers: Mutex<HashMap<PeerHandle, Peer>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl Inner {
    fn peers(&self) -> MutexGuard<'_, HashMap<PeerHandle, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: EngineCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn with_peer<T>(&self, peer: PeerHandle, f: impl FnOnce(&mut Peer) -> T) -> Option<T> {
        self.peers().get_mut(&peer).map(f)
    }

    fn is_canceled(&self, peer: PeerHandle) -> bool {
        self.with_peer(peer, |p| p.canceled).unwrap_or(true)
    }
}

/// Loopback [`TransportEngine`]. Clones share peers and the call log.
#[derive(Clone)]
pub struct LoopbackEngine {
    inner: Arc<Inner>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::with_behavior(Behavior::default())
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            inner: Arc::new(Inner {
                behavior,
                next_id: AtomicU64::new(1),
                peers: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lengths and last-flags of every appended chunk.
    pub fn appended_chunks(&self) -> Vec<(usize, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::AppendChunk { len, is_last } => Some((len, is_last)),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Peers created and not yet destroyed.
    pub fn live_peers(&self) -> usize {
        self.inner.peers().len()
    }
}

async fn drive(
    inner: Arc<Inner>,
    peer: PeerHandle,
    callbacks: RequestCallbacks,
    mut events: mpsc::UnboundedReceiver<Delivery>,
) {
    let read_size = inner.behavior.read_size.max(1);

    while let Some(delivery) = events.recv().await {
        match delivery {
            Delivery::ChunkAck => {
                callbacks.deliver(EngineEvent::AppendChunkCompleted).await;
            }
            Delivery::Respond(body) => {
                callbacks.deliver(EngineEvent::ResponseStarted).await;
                for piece in body.chunks(read_size) {
                    if inner.is_canceled(peer) {
                        tracing::trace!(peer = peer.as_raw(), "Response cut short by cancel");
                        break;
                    }
                    callbacks.deliver(EngineEvent::BytesRead(piece)).await;
                }
                callbacks.deliver(EngineEvent::Finish).await;
                break;
            }
            Delivery::Finish => {
                callbacks.deliver(EngineEvent::Finish).await;
                break;
            }
        }
    }

    tracing::trace!(peer = peer.as_raw(), "Loopback driver exiting");
}

impl TransportEngine for LoopbackEngine {
    fn create_peer(&self, url: &str, priority: Priority, callbacks: RequestCallbacks) -> PeerHandle {
        let handle = PeerHandle::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner.peers().insert(
            handle,
            Peer {
                events: tx,
                upload: Upload::None,
                upload_type: None,
                started: false,
                canceled: false,
                finish_queued: false,
                error_code: ErrorCode::Success,
                error_string: String::new(),
                http_status: 0,
                content_type: None,
                content_length: -1,
            },
        );
        self.inner.record(EngineCall::CreatePeer {
            url: url.to_string(),
            priority,
        });

        tokio::spawn(drive(self.inner.clone(), handle, callbacks, rx));
        handle
    }

    fn add_header(&self, _peer: PeerHandle, name: &str, value: &str) {
        self.inner.record(EngineCall::AddHeader {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn set_upload_data(&self, peer: PeerHandle, content_type: Option<&str>, data: Bytes) {
        self.inner.record(EngineCall::SetUploadData {
            content_type: content_type.map(str::to_string),
            len: data.len(),
        });
        self.inner.with_peer(peer, |p| {
            p.upload_type = content_type.map(str::to_string);
            p.upload = Upload::Fixed(data);
        });
    }

    fn begin_chunked_upload(&self, peer: PeerHandle, content_type: Option<&str>) {
        self.inner.record(EngineCall::BeginChunkedUpload {
            content_type: content_type.map(str::to_string),
        });
        self.inner.with_peer(peer, |p| {
            p.upload_type = content_type.map(str::to_string);
            p.upload = Upload::Chunked {
                received: BytesMut::new(),
                chunks: 0,
                complete: false,
            };
        });
    }

    fn append_chunk(&self, peer: PeerHandle, chunk: UploadChunk) {
        self.inner.record(EngineCall::AppendChunk {
            len: chunk.data.len(),
            is_last: chunk.is_last,
        });
        let behavior = &self.inner.behavior;
        self.inner.with_peer(peer, |p| {
            if let Upload::Chunked {
                received,
                chunks,
                complete,
            } = &mut p.upload
            {
                received.extend_from_slice(&chunk.data);
                *chunks += 1;
                *complete = chunk.is_last;

                if behavior.reject_upload_after.is_some_and(|limit| *chunks >= limit) {
                    p.finish_with(ErrorCode::Unknown, UPLOAD_REJECTED);
                    return;
                }
            }
            if behavior.acknowledge_chunks {
                p.queue(Delivery::ChunkAck);
            }
            if chunk.is_last {
                p.respond_if_ready(behavior);
            }
        });
    }

    fn start(&self, peer: PeerHandle) {
        self.inner.record(EngineCall::Start);
        let behavior = &self.inner.behavior;
        self.inner.with_peer(peer, |p| {
            p.started = true;
            p.respond_if_ready(behavior);
        });
    }

    fn cancel(&self, peer: PeerHandle) {
        self.inner.record(EngineCall::Cancel);
        self.inner.with_peer(peer, |p| {
            p.canceled = true;
            p.finish_with(ErrorCode::Unknown, ABORTED);
        });
    }

    fn destroy_peer(&self, peer: PeerHandle) {
        self.inner.record(EngineCall::DestroyPeer);
        self.inner.peers().remove(&peer);
    }

    fn error_code(&self, peer: PeerHandle) -> i32 {
        self.inner
            .with_peer(peer, |p| p.error_code.as_raw())
            .unwrap_or(ErrorCode::Success.as_raw())
    }

    fn http_status_code(&self, peer: PeerHandle) -> u16 {
        self.inner.with_peer(peer, |p| p.http_status).unwrap_or(0)
    }

    fn error_string(&self, peer: PeerHandle) -> String {
        self.inner
            .with_peer(peer, |p| p.error_string.clone())
            .unwrap_or_default()
    }

    fn content_type(&self, peer: PeerHandle) -> Option<String> {
        self.inner.with_peer(peer, |p| p.content_type.clone()).flatten()
    }

    fn content_length(&self, peer: PeerHandle) -> i64 {
        self.inner.with_peer(peer, |p| p.content_length).unwrap_or(-1)
    }
}
