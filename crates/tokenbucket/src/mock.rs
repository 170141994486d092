//! Simulated time, for testing.
//!
//! See [`MockClock`].

use std::future::{self, Ready};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::time::{BlockingClock, Clock, SleepProvider};

/// A [`Clock`] whose time only moves when told to.
///
/// Sleeping, whether blocking or asynchronous, never waits for real:
/// it moves the simulated time forward by the requested duration at once,
/// and remembers that it did so.
///
/// Clones share the same simulated time.
#[derive(Clone, Debug)]
pub struct MockClock {
    /// The actual state
    state: Arc<Mutex<State>>,
}

/// Mutable state for a [`MockClock`]
#[derive(Debug)]
struct State {
    /// Current time
    now: Instant,
    /// Total time spent sleeping so far
    slept: Duration,
    /// Number of sleeps so far
    sleeps: usize,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Return a new mock clock, starting at the current actual (non-mock) time
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Return a new mock clock, starting at `now`
    pub fn starting_at(now: Instant) -> Self {
        let state = State {
            now,
            slept: Duration::ZERO,
            sleeps: 0,
        };
        MockClock {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Move the simulated time forward by `duration`, without counting it as a sleep.
    pub fn advance(&self, duration: Duration) {
        self.lock().now += duration;
    }

    /// Total simulated time spent in sleeps so far.
    pub fn slept(&self) -> Duration {
        self.lock().slept
    }

    /// Number of sleeps so far.
    pub fn sleep_count(&self) -> usize {
        self.lock().sleeps
    }

    /// Record a sleep of `duration`, and move time forward accordingly.
    fn record_sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.now += duration;
        state.slept += duration;
        state.sleeps += 1;
    }

    /// Lock and return the state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.lock().now
    }
}

impl BlockingClock for MockClock {
    fn block_for(&self, duration: Duration) {
        self.record_sleep(duration);
    }
}

impl SleepProvider for MockClock {
    type SleepFuture = Ready<()>;

    fn sleep(&self, duration: Duration) -> Self::SleepFuture {
        self.record_sleep(duration);
        future::ready(())
    }
}
