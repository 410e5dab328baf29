use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

pub(crate) type ResponseSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Drains borrowed response buffers into the caller's sink.
pub(crate) struct ResponseSinkWriter {
    sink: Option<ResponseSink>,
}

impl ResponseSinkWriter {
    pub(crate) fn new(sink: ResponseSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Writes all of `buf`, tolerating partial writes.
    ///
    /// Nothing from `buf` is kept once this returns. Writing after
    /// [`close`](Self::close) is a no-op.
    pub(crate) async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            tracing::trace!(len = buf.len(), "Discarding response bytes after sink close");
            return Ok(());
        };

        let mut written = 0;
        while written < buf.len() {
            let n = sink.write(&buf[written..]).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "sink closed while writing",
                ));
            }

            written += n;
        }

        Ok(())
    }

    /// Shuts the sink down. Errors are logged and dropped.
    pub(crate) async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.shutdown().await {
                tracing::debug!(error = %e, "Ignoring sink close error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    /// Accepts at most three bytes per write.
    struct Trickle(Arc<Mutex<Vec<u8>>>);

    impl AsyncWrite for Trickle {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(3);
            self.0.lock().unwrap().extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn partial_writes_are_retried_until_drained() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut writer = ResponseSinkWriter::new(Box::new(client));
        writer.write_all(b"hello, world").await.unwrap();
        writer.close().await;

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut out).await.unwrap();
        assert_eq!(out, b"hello, world");
    }

    #[tokio::test]
    async fn trickling_sink_receives_everything() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut writer = ResponseSinkWriter::new(Box::new(Trickle(received.clone())));
        writer.write_all(b"0123456789").await.unwrap();
        assert_eq!(*received.lock().unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn zero_length_write_is_an_error() {
        struct Full;
        impl AsyncWrite for Full {
            fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
                Poll::Ready(Ok(0))
            }
            fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
            fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let mut writer = ResponseSinkWriter::new(Box::new(Full));
        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
