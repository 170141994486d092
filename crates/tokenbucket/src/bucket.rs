//! The token bucket itself.
//!
//! Time is cut into ticks of `fill_interval`, counted from the instant the
//! bucket was made. Each tick that passes adds `quantum` tokens, up to the
//! capacity. We don't keep a timer running: instead, every request first
//! *reconciles* the balance with the current tick, and then debits it.
//!
//! A request for more tokens than are available still succeeds. The balance
//! goes negative, and the caller learns how long it has to wait for the tick
//! at which the debt will have been paid off.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::{TokenBucketConfig, check_fill_interval};
use crate::err::{ConfigBuildError, ExceedsMaxWaitError};
use crate::time::{BlockingClock, Clock, SleepProvider, SystemClock};

/// A token bucket.
///
/// Starts out full, holds at most [`capacity()`](TokenBucket::capacity)
/// tokens, and gains [`quantum()`](TokenBucket::quantum) tokens every
/// [`fill_interval()`](TokenBucket::fill_interval).
///
/// A bucket can be shared between threads (usually in an `Arc`); all its state
/// is behind one lock, held for the whole of each request.
/// There is no fairness between contending callers: requests are served in
/// whatever order they happen to take the lock.
#[derive(educe::Educe)]
#[educe(Debug)]
pub struct TokenBucket<C: Clock = SystemClock> {
    /// Where we get the time from, and how we block.
    #[educe(Debug(ignore))]
    clock: C,
    /// The instant from which ticks are counted.
    start_time: Instant,
    /// Maximum number of tokens in the bucket.
    capacity: i64,
    /// Number of tokens added per tick.
    quantum: i64,
    /// Everything that can change after construction.
    state: Mutex<State>,
}

/// The mutable part of a [`TokenBucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    /// Length of a tick.
    ///
    /// Never zero.
    fill_interval: Duration,
    /// Current balance.
    ///
    /// Never above the capacity; negative when callers have taken tokens that
    /// haven't been added yet.
    available: i64,
    /// The tick at which `available` was last reconciled.
    ///
    /// Never decreases.
    latest_tick: i64,
}

/// The result of a debit that has been worked out but not yet applied.
#[derive(Debug, Clone, Copy)]
struct Debit {
    /// The state to store if the debit goes ahead.
    next: State,
    /// How long the caller must wait before using the tokens.
    wait: Duration,
}

impl TokenBucket<SystemClock> {
    /// Create a new bucket holding at most `capacity` tokens, and gaining one
    /// token every `fill_interval`.
    ///
    /// The bucket starts out full.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigBuildError::Invalid`] if `fill_interval` is zero
    /// or `capacity` is less than 1.
    pub fn new(fill_interval: Duration, capacity: i64) -> Result<Self, ConfigBuildError> {
        let config = TokenBucketConfig::builder()
            .fill_interval(fill_interval)
            .capacity(capacity)
            .build()?;
        Ok(Self::from_config(&config))
    }

    /// Create a new full bucket from `config`, using the system clock.
    pub fn from_config(config: &TokenBucketConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new full bucket from `config`, taking times from `clock`.
    pub fn with_clock(config: &TokenBucketConfig, clock: C) -> Self {
        let start_time = clock.now();
        let state = State {
            fill_interval: config.fill_interval,
            available: config.capacity,
            latest_tick: 0,
        };
        TokenBucket {
            clock,
            start_time,
            capacity: config.capacity,
            quantum: config.quantum,
            state: Mutex::new(state),
        }
    }

    /// Take `count` tokens from the bucket without blocking.
    ///
    /// Returns how long the caller should wait before the tokens are actually
    /// available: [`Duration::ZERO`] if they are available now.
    ///
    /// This always succeeds, and is irrevocable: once this returns, the tokens
    /// are spent, even if the caller decides not to wait.
    /// Asking for zero or fewer tokens does nothing.
    pub fn take(&self, count: i64) -> Duration {
        let mut state = self.lock();
        let now = self.clock.now();
        match self.debit(&state, now, count) {
            Some(debit) => self.commit(&mut state, count, debit),
            None => Duration::ZERO,
        }
    }

    /// Take `count` tokens from the bucket without blocking, unless that
    /// would mean waiting longer than `max_wait`.
    ///
    /// On success, returns how long the caller should wait before the tokens
    /// are available, as for [`take()`](TokenBucket::take).
    ///
    /// # Errors
    ///
    /// If the tokens would not be available within `max_wait`, returns an
    /// [`ExceedsMaxWaitError`] and leaves the bucket exactly as it was.
    pub fn take_max_duration(
        &self,
        count: i64,
        max_wait: Duration,
    ) -> Result<Duration, ExceedsMaxWaitError> {
        let mut state = self.lock();
        let now = self.clock.now();
        let Some(debit) = self.debit(&state, now, count) else {
            return Ok(Duration::ZERO);
        };
        if debit.wait > max_wait {
            debug!(
                count,
                wait = ?debit.wait,
                ?max_wait,
                "Refusing token request that would wait too long"
            );
            return Err(ExceedsMaxWaitError {
                count,
                wait: debit.wait,
                max_wait,
            });
        }
        Ok(self.commit(&mut state, count, debit))
    }

    /// Change the length of a tick.
    ///
    /// This takes effect at once. Tokens owed under the old interval are not
    /// settled first: since ticks are always counted from the bucket's
    /// creation, the number of elapsed ticks can jump (either way) at the
    /// moment of the change. When it jumps backwards, no tokens are added
    /// until the tick count has caught up again.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigBuildError::Invalid`] if `fill_interval` is zero;
    /// the bucket is left unchanged.
    pub fn change_interval(&self, fill_interval: Duration) -> Result<(), ConfigBuildError> {
        check_fill_interval(fill_interval)?;
        let mut state = self.lock();
        let old = std::mem::replace(&mut state.fill_interval, fill_interval);
        debug!(?old, new = ?fill_interval, "Changed token bucket fill interval");
        Ok(())
    }

    /// Return the capacity that the bucket was created with.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Return the number of tokens added per tick.
    pub fn quantum(&self) -> i64 {
        self.quantum
    }

    /// Return the current length of a tick.
    pub fn fill_interval(&self) -> Duration {
        self.lock().fill_interval
    }

    /// Return the fill rate of the bucket, in tokens per second.
    pub fn rate(&self) -> f64 {
        let fill_interval = self.lock().fill_interval;
        1e9 * self.quantum as f64 / fill_interval.as_nanos() as f64
    }

    /// Return the number of tokens that would be in the bucket if it were
    /// reconciled now.
    ///
    /// Negative if callers have taken tokens that haven't been added yet.
    /// This doesn't change the bucket: in particular it doesn't count as a
    /// reconciliation.
    pub fn available(&self) -> i64 {
        let state = self.lock();
        let now = self.clock.now();
        let tick = self.tick_at(&state, now);
        self.reconcile(&state, tick).available
    }

    /// Return the clock this bucket takes its times from.
    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// Lock and return the state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    /// Work out what taking `count` tokens at `now` would do, without doing it.
    ///
    /// Returns `None` if `count` is not positive, in which case there is
    /// nothing to do.
    fn debit(&self, state: &State, now: Instant, count: i64) -> Option<Debit> {
        if count <= 0 {
            return None;
        }

        // After the interval grows, the tick count can fall behind
        // latest_tick. Tokens are only ever added after latest_tick.
        let tick = self.tick_at(state, now).max(state.latest_tick);
        let mut next = self.reconcile(state, tick);
        let remaining = next.available.saturating_sub(count);
        next.available = remaining;
        if remaining >= 0 {
            return Some(Debit {
                next,
                wait: Duration::ZERO,
            });
        }

        // The tick at which enough tokens will have been added to cover the
        // deficit.
        let deficit = remaining.saturating_neg();
        let deficit_ticks = deficit.saturating_add(self.quantum - 1) / self.quantum;
        let end_tick = tick.saturating_add(deficit_ticks);
        let wait = self
            .tick_start(state.fill_interval, end_tick)
            .map_or(Duration::MAX, |end| end.saturating_duration_since(now));

        Some(Debit { next, wait })
    }

    /// Store the outcome of `debit`, and return how long to wait.
    fn commit(&self, state: &mut State, count: i64, debit: Debit) -> Duration {
        *state = debit.next;
        if !debit.wait.is_zero() {
            trace!(
                count,
                available = state.available,
                wait = ?debit.wait,
                "Took tokens ahead of refill"
            );
        }
        debit.wait
    }

    /// Return `state` brought up to date with `tick`.
    ///
    /// A bucket that is already full is returned as is, without even moving
    /// `latest_tick` forward: counting resumes from the last tick at which we
    /// actually reconciled.
    fn reconcile(&self, state: &State, tick: i64) -> State {
        let mut next = *state;
        if state.available >= self.capacity {
            return next;
        }
        let elapsed_ticks = tick.saturating_sub(state.latest_tick).max(0);
        next.available = state
            .available
            .saturating_add(elapsed_ticks.saturating_mul(self.quantum))
            .min(self.capacity);
        next.latest_tick = state.latest_tick.max(tick);
        next
    }

    /// Return the index of the tick containing `now`.
    fn tick_at(&self, state: &State, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.start_time).as_nanos();
        let tick = elapsed / state.fill_interval.as_nanos();
        i64::try_from(tick).unwrap_or(i64::MAX)
    }

    /// Return the instant at which tick number `tick` starts.
    ///
    /// Returns `None` if that instant can't be represented.
    fn tick_start(&self, fill_interval: Duration, tick: i64) -> Option<Instant> {
        let tick = u128::try_from(tick).ok()?;
        let offset = fill_interval.as_nanos().checked_mul(tick)?;
        let offset = Duration::from_nanos(u64::try_from(offset).ok()?);
        self.start_time.checked_add(offset)
    }
}

impl<C: BlockingClock> TokenBucket<C> {
    /// Take `count` tokens from the bucket, blocking the calling thread until
    /// they are available.
    ///
    /// The lock is not held while we sleep.
    pub fn wait(&self, count: i64) {
        let wait = self.take(count);
        self.block_for(wait);
    }

    /// Take `count` tokens from the bucket, blocking the calling thread until
    /// they are available, unless that would mean waiting longer than
    /// `max_wait`.
    ///
    /// # Errors
    ///
    /// If the tokens would not be available within `max_wait`, returns
    /// immediately with an [`ExceedsMaxWaitError`], having taken nothing.
    pub fn wait_max_duration(
        &self,
        count: i64,
        max_wait: Duration,
    ) -> Result<(), ExceedsMaxWaitError> {
        let wait = self.take_max_duration(count, max_wait)?;
        self.block_for(wait);
        Ok(())
    }

    /// Block the calling thread for `wait`, if it is nonzero.
    fn block_for(&self, wait: Duration) {
        if !wait.is_zero() {
            trace!(?wait, "Blocking until tokens are available");
            self.clock.block_for(wait);
        }
    }
}

impl<C: SleepProvider> TokenBucket<C> {
    /// Take `count` tokens from the bucket, and sleep asynchronously until
    /// they are available.
    ///
    /// The tokens are taken when this is first polled, and stay taken even if
    /// the future is then dropped.
    pub async fn wait_async(&self, count: i64) {
        let wait = self.take(count);
        if !wait.is_zero() {
            trace!(?wait, "Sleeping until tokens are available");
            self.clock.sleep(wait).await;
        }
    }
}
