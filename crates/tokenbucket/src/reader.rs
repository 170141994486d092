//! A [`Read`] rate limiter.

use std::io::{self, Read};
use std::sync::Arc;

use crate::bucket::TokenBucket;
use crate::time::{BlockingClock, Clock, SystemClock};
use crate::tokens_for_len;

/// A rate-limited [reader](Read).
///
/// Unlike [`RateLimitedWriter`](crate::RateLimitedWriter), this reads first
/// and pays afterwards: we can't know how many bytes a read will return until
/// it has returned them. Each call to [`read()`](Read::read) then takes one
/// token per byte actually read, blocking until they are available.
#[derive(educe::Educe)]
#[educe(Debug)]
pub struct RateLimitedReader<R, C: Clock = SystemClock> {
    /// The inner reader.
    #[educe(Debug(ignore))]
    inner: R,
    /// The token bucket, possibly shared with other readers.
    #[educe(Debug(ignore))]
    bucket: Arc<TokenBucket<C>>,
}

impl<R: Read, C: Clock> RateLimitedReader<R, C> {
    /// Create a new [`RateLimitedReader`] reading from `inner`, limited by `bucket`.
    pub fn new(inner: R, bucket: Arc<TokenBucket<C>>) -> Self {
        RateLimitedReader { inner, bucket }
    }

    /// Access the inner reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Return the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read, C: BlockingClock> Read for RateLimitedReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bucket.wait(tokens_for_len(n));
        Ok(n)
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::mixed_attributes_style)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::config::TokenBucketConfig;
    use crate::mock::MockClock;

    use std::time::Duration;

    #[test]
    fn reader() {
        let interval = Duration::from_millis(20);
        let config = TokenBucketConfig::builder()
            .fill_interval(interval)
            .capacity(8)
            .quantum(2)
            .build()
            .unwrap();
        let clock = MockClock::new();
        let bucket = Arc::new(TokenBucket::with_clock(&config, clock.clone()));

        let data: Vec<u8> = (0..20).collect();
        let mut reader = RateLimitedReader::new(&data[..], bucket.clone());

        let mut buf = [0; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 8);
        assert_eq!(clock.sleep_count(), 0);

        // 8 more tokens at 2 per tick.
        assert_eq!(reader.read(&mut buf).unwrap(), 8);
        assert_eq!(clock.slept(), interval * 4);

        // Only 4 bytes left: we pay for what we got, not for the buffer.
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[16, 17, 18, 19]);
        assert_eq!(clock.slept(), interval * 6);

        // End of input costs nothing.
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(clock.sleep_count(), 2);
        assert_eq!(bucket.available(), 0);
    }
}
