//! An [`AsyncWrite`] rate limiter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::AsyncWrite;
use futures::io::Error;
use futures::ready;
use sync_wrapper::SyncFuture;

use crate::bucket::TokenBucket;
use crate::time::SleepProvider;
use crate::tokens_for_len;

/// A rate-limited async [writer](AsyncWrite).
///
/// This can be used as a wrapper around an existing [`AsyncWrite`] writer.
///
/// When a write is first polled, we take one token per byte of the buffer from
/// the bucket, and if that puts the bucket in debt, sleep (using the bucket's
/// [`SleepProvider`]) until it's paid off. Only then is the buffer passed to
/// the inner writer.
///
/// Tokens that have been paid for but not yet written (because the inner
/// writer returned `Pending`, an error, or a short write) are remembered, and
/// used for the next write, so that retrying a write doesn't pay for it twice.
#[derive(educe::Educe)]
#[educe(Debug)]
#[pin_project::pin_project]
pub struct AsyncRateLimitedWriter<W, P: SleepProvider> {
    /// The token bucket, possibly shared with other writers.
    #[educe(Debug(ignore))]
    bucket: Arc<TokenBucket<P>>,
    /// Number of bytes we have taken tokens for, but haven't written yet.
    prepaid: usize,
    /// The inner writer.
    #[educe(Debug(ignore))]
    #[pin]
    inner: W,
    /// We need to store the sleep future if [`AsyncWrite::poll_write()`] blocks.
    #[educe(Debug(ignore))]
    #[pin]
    sleep_fut: Option<SyncFuture<P::SleepFuture>>,
}

impl<W, P> AsyncRateLimitedWriter<W, P>
where
    W: AsyncWrite,
    P: SleepProvider,
{
    /// Create a new [`AsyncRateLimitedWriter`] writing to `inner`, limited by `bucket`.
    pub fn new(inner: W, bucket: Arc<TokenBucket<P>>) -> Self {
        Self {
            bucket,
            prepaid: 0,
            inner,
            sleep_fut: None,
        }
    }

    /// Access the inner [`AsyncWrite`] writer.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Access the token bucket.
    pub fn bucket(&self) -> &Arc<TokenBucket<P>> {
        &self.bucket
    }
}

impl<W, P> AsyncWrite for AsyncRateLimitedWriter<W, P>
where
    W: AsyncWrite,
    P: SleepProvider,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, Error>> {
        let mut self_ = self.project();

        // for an empty buffer, just defer to the inner writer's impl
        if buf.is_empty() {
            return self_.inner.poll_write(cx, buf);
        }

        if *self_.prepaid < buf.len() {
            let owed = buf.len() - *self_.prepaid;
            let wait = self_.bucket.take(tokens_for_len(owed));
            *self_.prepaid = buf.len();
            if !wait.is_zero() {
                let sleep = self_.bucket.clock().sleep(wait);
                self_.sleep_fut.set(Some(SyncFuture::new(sleep)));
            }
        }

        if let Some(sleep) = self_.sleep_fut.as_mut().as_pin_mut() {
            ready!(sleep.poll(cx));
            self_.sleep_fut.set(None);
        }

        let rv = ready!(self_.inner.poll_write(cx, buf));
        if let Ok(written) = &rv {
            *self_.prepaid = self_.prepaid.saturating_sub(*written);
        }
        Poll::Ready(rv)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.project().inner.poll_close(cx)
    }
}

/// A module to make it easier to implement tokio traits without putting `cfg()` conditionals
/// everywhere.
#[cfg(feature = "tokio")]
mod tokio_impl {
    use super::*;

    use tokio_crate::io::AsyncWrite as TokioAsyncWrite;
    use tokio_util::compat::FuturesAsyncWriteCompatExt;

    use std::io::Result as IoResult;

    impl<W, P> TokioAsyncWrite for AsyncRateLimitedWriter<W, P>
    where
        W: AsyncWrite,
        P: SleepProvider,
    {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<IoResult<usize>> {
            TokioAsyncWrite::poll_write(Pin::new(&mut self.compat_write()), cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
            TokioAsyncWrite::poll_flush(Pin::new(&mut self.compat_write()), cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
            TokioAsyncWrite::poll_shutdown(Pin::new(&mut self.compat_write()), cx)
        }
    }
}
