use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;

/// Upper bound of bytes taken from a single write.
const MAX_PENDING: usize = 64 * 1024;

pin_project! {
    /// Writes everything written to it to two writers.
    ///
    /// A write is accepted into an internal buffer once the previous one has
    /// reached both writers, so a slow writer holds back the other.
    pub struct TeeWriter<A, B> {
        #[pin]
        a: A,
        #[pin]
        b: B,
        pending: Vec<u8>,
        a_pos: usize,
        b_pos: usize,
    }
}

impl<A, B> TeeWriter<A, B>
where
    A: AsyncWrite,
    B: AsyncWrite,
{
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            pending: Vec::new(),
            a_pos: 0,
            b_pos: 0,
        }
    }

    /// Writes the pending buffer to both writers.
    fn poll_drain(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut this = self.project();

        let a_done = drain_into(this.a.as_mut(), cx, this.pending, this.a_pos)?;
        let b_done = drain_into(this.b.as_mut(), cx, this.pending, this.b_pos)?;

        if a_done.is_pending() || b_done.is_pending() {
            return Poll::Pending;
        }

        this.pending.clear();
        *this.a_pos = 0;
        *this.b_pos = 0;
        Poll::Ready(Ok(()))
    }
}

fn drain_into<W: AsyncWrite>(
    mut w: Pin<&mut W>,
    cx: &mut Context<'_>,
    buf: &[u8],
    pos: &mut usize,
) -> io::Result<Poll<()>> {
    while *pos < buf.len() {
        match w.as_mut().poll_write(cx, &buf[*pos..]) {
            Poll::Pending => return Ok(Poll::Pending),
            Poll::Ready(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
            Poll::Ready(Ok(n)) => *pos += n,
            Poll::Ready(Err(e)) => return Err(e),
        }
    }
    Ok(Poll::Ready(()))
}

impl<A, B> AsyncWrite for TeeWriter<A, B>
where
    A: AsyncWrite,
    B: AsyncWrite,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        ready!(self.as_mut().poll_drain(cx))?;

        let n = buf.len().min(MAX_PENDING);
        self.project().pending.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_drain(cx))?;

        let mut this = self.project();
        let a_done = this.a.as_mut().poll_flush(cx)?;
        let b_done = this.b.as_mut().poll_flush(cx)?;
        if a_done.is_pending() || b_done.is_pending() {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_drain(cx))?;

        let mut this = self.project();
        let a_done = this.a.as_mut().poll_shutdown(cx)?;
        let b_done = this.b.as_mut().poll_shutdown(cx)?;
        if a_done.is_pending() || b_done.is_pending() {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}
