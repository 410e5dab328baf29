//! Chunked upload from a byte stream.
//!
//! The engine must be told up front whether a chunk is the last one, but a
//! stream only reveals its end when a read comes back empty. The pump
//! therefore reads one byte past every chunk and carries it over into the
//! next one:
//!
//! ```text
//!   [carry | fill up to capacity ........] + peek 1 byte
//!                                             |
//!                      EOF -> submit as last, stop
//!                      byte -> submit, wait for ack, carry it over
//! ```
//!
//! Only one chunk buffer is ever in flight. After submitting a non-final
//! chunk the pump waits for the engine's acknowledgement, which is also
//! released by teardown so the wait cannot outlive the request.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;

use crate::engine::UploadChunk;
use crate::request::Shared;
use crate::request::state::UploadStream;

pub(crate) struct ChunkedUploadPump<'a> {
    request: &'a Shared,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl<'a> ChunkedUploadPump<'a> {
    pub(crate) fn new(request: &'a Shared, permits: Arc<Semaphore>, capacity: usize) -> Self {
        Self {
            request,
            permits,
            capacity,
        }
    }

    /// Drains `source` into the engine. The source is dropped, and thereby
    /// closed, on every exit path.
    pub(crate) async fn run(self, mut source: UploadStream) {
        match self.drain(&mut source).await {
            Ok(chunks) => {
                tracing::debug!(url = %self.request.url, chunks, "Upload pump finished");
            }
            Err(e) => {
                tracing::warn!(url = %self.request.url, error = %e, "Reading upload source failed");
                self.request.abort_with(e).await;
            }
        }
        drop(source);
    }

    /// Returns the number of chunks handed to the engine.
    async fn drain<R>(&self, source: &mut R) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buffer = BytesMut::with_capacity(self.capacity);
        let mut carry: Option<u8> = None;
        let mut submitted = 0;

        loop {
            // Reclaims the previous allocation once the engine dropped its chunk.
            buffer.reserve(self.capacity);
            if let Some(byte) = carry.take() {
                buffer.put_u8(byte);
            }

            let exhausted = fill(source, &mut buffer, self.capacity).await?;
            if !exhausted {
                carry = peek(source).await?;
            }
            let is_last = carry.is_none();

            let chunk = UploadChunk {
                data: buffer.split().freeze(),
                is_last,
            };
            let chunk_len = chunk.data.len();

            if !self.request.submit_chunk(chunk).await {
                tracing::debug!(url = %self.request.url, "Upload stopped before submitting chunk");
                return Ok(submitted);
            }
            submitted += 1;
            tracing::trace!(chunk_len, is_last, "Submitted upload chunk");

            if is_last {
                return Ok(submitted);
            }

            match self.permits.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Ok(submitted),
            }

            if self.request.upload_should_stop().await {
                tracing::debug!(url = %self.request.url, "Upload stopped by cancel or finish");
                return Ok(submitted);
            }
        }
    }
}

/// Reads into `buffer` until it holds `capacity` bytes or the source ends.
/// Returns true if the source ended.
async fn fill<R>(source: &mut R, buffer: &mut BytesMut, capacity: usize) -> io::Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = buffer.len();
    buffer.resize(capacity, 0);

    let mut exhausted = false;
    while filled < capacity {
        let n = source.read(&mut buffer[filled..]).await?;
        if n == 0 {
            exhausted = true;
            break;
        }
        filled += n;
    }

    buffer.truncate(filled);
    Ok(exhausted)
}

/// Reads a single byte, `None` at end of stream.
async fn peek<R>(source: &mut R) -> io::Result<Option<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    let n = source.read(&mut byte).await?;
    Ok((n == 1).then_some(byte[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fill_stops_at_capacity() {
        let mut source: &[u8] = &[7u8; 10];
        let mut buffer = BytesMut::new();
        let exhausted = fill(&mut source, &mut buffer, 4).await.unwrap();
        assert!(!exhausted);
        assert_eq!(&buffer[..], &[7, 7, 7, 7]);
        assert_eq!(source.len(), 6);
    }

    #[tokio::test]
    async fn fill_keeps_carried_byte() {
        let mut source: &[u8] = b"bc";
        let mut buffer = BytesMut::new();
        buffer.put_u8(b'a');
        let exhausted = fill(&mut source, &mut buffer, 8).await.unwrap();
        assert!(exhausted);
        assert_eq!(&buffer[..], b"abc");
    }

    #[tokio::test]
    async fn peek_reports_end_of_stream() {
        let mut source: &[u8] = b"z";
        assert_eq!(peek(&mut source).await.unwrap(), Some(b'z'));
        assert_eq!(peek(&mut source).await.unwrap(), None);
    }
}
