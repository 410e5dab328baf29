#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use netreq::engine::loopback::{Behavior, LoopbackEngine};
use netreq::{Config, RequestContext, RequestOutcome, UrlRequest};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn context_with(engine: &LoopbackEngine, upload_chunk_size: usize) -> RequestContext {
    let cfg = Config {
        upload_chunk_size,
        ..Config::default()
    };
    RequestContext::new(Arc::new(engine.clone()), cfg)
}

pub fn engine_and_context(behavior: Behavior) -> (LoopbackEngine, RequestContext) {
    let engine = LoopbackEngine::with_behavior(behavior);
    let ctx = context_with(&engine, Config::default().upload_chunk_size);
    (engine, ctx)
}

pub async fn complete(request: &UrlRequest) -> RequestOutcome {
    tokio::time::timeout(TIMEOUT, request.wait_for_completion())
        .await
        .expect("request did not complete in time")
}

/// Polls `check` until it holds, failing the test after [`TIMEOUT`].
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}

/// Sink that stores everything written and remembers being shut down.
#[derive(Clone, Default)]
pub struct CaptureSink {
    pub data: Arc<Mutex<Vec<u8>>>,
    pub closed: Arc<AtomicBool>,
}

impl CaptureSink {
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AsyncWrite for CaptureSink {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Sink whose writes always fail and whose shutdown fails too.
pub struct BrokenSink;

impl AsyncWrite for BrokenSink {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink is gone")))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("close failed")))
    }
}

/// Source that yields one byte per read and records when it is dropped.
pub struct TrickleSource {
    data: Vec<u8>,
    pos: usize,
    /// Fail with this error once `pos` reaches the value.
    fail_at: Option<usize>,
    pub dropped: Arc<AtomicBool>,
}

impl TrickleSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            fail_at: None,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing_at(mut self, pos: usize) -> Self {
        self.fail_at = Some(pos);
        self
    }
}

impl AsyncRead for TrickleSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.fail_at == Some(self.pos) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "source reset")));
        }
        if self.pos < self.data.len() && buf.remaining() > 0 {
            let byte = self.data[self.pos];
            buf.put_slice(&[byte]);
            self.pos += 1;
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for TrickleSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
