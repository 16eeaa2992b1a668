//! Peekable connection wrapper.
//!
//! Bytes read while identifying the protocol are buffered and replayed, in
//! order, to whichever adapter takes over the connection.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

#[derive(Debug)]
pub(crate) struct Sniffed<S> {
    inner: S,
    buffered: BytesMut,
}

impl<S> Sniffed<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            buffered: BytesMut::new(),
        }
    }

    /// Bytes consumed from the peer but not yet replayed.
    pub(crate) fn prefix(&self) -> &[u8] {
        &self.buffered
    }
}

impl<S: AsyncRead + Unpin> Sniffed<S> {
    /// Read more bytes into the prefix without growing it beyond `limit`.
    /// Returns the number of new bytes; zero means the peer closed.
    pub(crate) async fn fill(&mut self, limit: usize) -> io::Result<usize> {
        let remaining = limit.saturating_sub(self.buffered.len());

        if remaining == 0 {
            return Ok(0);
        }

        let mut bounded = (&mut self.inner).take(remaining as u64);

        bounded.read_buf(&mut self.buffered).await
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Sniffed<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.buffered.has_remaining() {
            let n = this.buffered.len().min(buf.remaining());
            buf.put_slice(&this.buffered.split_to(n));

            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Sniffed<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
