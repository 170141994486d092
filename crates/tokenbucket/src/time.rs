//! Sources of time for a [`TokenBucket`](crate::TokenBucket).
//!
//! A bucket reads the current time only through a [`Clock`], and blocks its
//! callers only through a [`BlockingClock`] or a [`SleepProvider`], so that
//! tests can substitute simulated time for real time.

use std::future::Future;
use std::time::{Duration, Instant};

/// A source of monotonic time.
///
/// Every [`Instant`] handed to a [`TokenBucket`](crate::TokenBucket) comes from
/// its clock: use [`Clock::now()`], not [`Instant::now()`].
pub trait Clock: Send + Sync + 'static {
    /// Return the clock's view of the current instant.
    fn now(&self) -> Instant;
}

/// A [`Clock`] that can put the calling thread to sleep.
///
/// Needed for the blocking operations of a bucket, such as
/// [`TokenBucket::wait()`](crate::TokenBucket::wait) and
/// [`RateLimitedWriter`](crate::RateLimitedWriter).
pub trait BlockingClock: Clock {
    /// Block the calling thread until `duration` has elapsed, as measured by
    /// this clock.
    fn block_for(&self, duration: Duration);
}

/// A [`Clock`] that can also sleep asynchronously.
pub trait SleepProvider: Clock {
    /// A future returned by [`SleepProvider::sleep()`]
    type SleepFuture: Future<Output = ()> + Send + 'static;

    /// Return a future that will be ready after `duration` has
    /// elapsed.
    #[must_use = "sleep() returns a future, which does nothing unless used"]
    fn sleep(&self, duration: Duration) -> Self::SleepFuture;
}

/// The real monotonic clock of the operating system.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl BlockingClock for SystemClock {
    fn block_for(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The clock of the ambient Tokio runtime.
///
/// Unlike [`SystemClock`], this follows Tokio's view of time, so it respects
/// [paused time](https://docs.rs/tokio/latest/tokio/time/fn.pause.html) in tests.
/// Async sleeps must happen inside a Tokio runtime.
///
/// This is not a [`BlockingClock`]: a thread blocked outside the runtime
/// can't make Tokio's time pass, which paused time would need. Use
/// [`TokenBucket::wait_async()`](crate::TokenBucket::wait_async) or
/// [`AsyncRateLimitedWriter`](crate::AsyncRateLimitedWriter) with it instead.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct TokioClock;

#[cfg(feature = "tokio")]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio_crate::time::Instant::now().into_std()
    }
}

#[cfg(feature = "tokio")]
impl SleepProvider for TokioClock {
    type SleepFuture = tokio_crate::time::Sleep;

    fn sleep(&self, duration: Duration) -> Self::SleepFuture {
        tokio_crate::time::sleep(duration)
    }
}
