//! A [`Write`] rate limiter.

use std::io::{self, Write};
use std::sync::Arc;

use crate::bucket::TokenBucket;
use crate::time::{BlockingClock, Clock, SystemClock};
use crate::tokens_for_len;

/// A rate-limited [writer](Write).
///
/// Each call to [`write()`](Write::write) takes one token per byte of the
/// buffer from the bucket, blocking until they are available, and then hands
/// the whole buffer to the inner writer. The inner writer's result, whatever
/// it is, is returned as is.
///
/// Tokens are taken for the whole buffer even if the inner writer accepts
/// only part of it, or fails. The bytes that were paid for but not written
/// are remembered, and count towards the next write, so that
/// [`write_all()`](Write::write_all) retrying the rest of a buffer after a
/// short write doesn't pay for it twice.
#[derive(educe::Educe)]
#[educe(Debug)]
pub struct RateLimitedWriter<W, C: Clock = SystemClock> {
    /// The inner writer.
    #[educe(Debug(ignore))]
    inner: W,
    /// Number of bytes we have taken tokens for, but haven't written yet.
    prepaid: usize,
    /// The token bucket, possibly shared with other writers.
    #[educe(Debug(ignore))]
    bucket: Arc<TokenBucket<C>>,
}

impl<W: Write, C: Clock> RateLimitedWriter<W, C> {
    /// Create a new [`RateLimitedWriter`] writing to `inner`, limited by `bucket`.
    pub fn new(inner: W, bucket: Arc<TokenBucket<C>>) -> Self {
        RateLimitedWriter {
            inner,
            prepaid: 0,
            bucket,
        }
    }

    /// Access the inner writer.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Access the token bucket.
    pub fn bucket(&self) -> &Arc<TokenBucket<C>> {
        &self.bucket
    }

    /// Return the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write, C: BlockingClock> Write for RateLimitedWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.prepaid < buf.len() {
            let owed = buf.len() - self.prepaid;
            self.bucket.wait(tokens_for_len(owed));
            self.prepaid = buf.len();
        }

        let rv = self.inner.write(buf);
        if let Ok(written) = &rv {
            self.prepaid = self.prepaid.saturating_sub(*written);
        }
        rv
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
