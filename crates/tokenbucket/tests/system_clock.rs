//! Tests of rate limiting in real time.
//!
//! These sleep for real, so the bounds are loose.

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

use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokenbucket::{RateLimitedWriter, TokenBucket, TokenBucketConfig};

#[test]
fn wait_sleeps_through_the_deficit() {
    let tb = TokenBucket::new(Duration::from_millis(10), 5).unwrap();
    assert_eq!(tb.rate(), 100.0);

    let start = Instant::now();
    tb.wait(5);
    assert!(start.elapsed() < Duration::from_millis(10));

    tb.wait(5);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(45), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[test]
fn writer_passthrough() {
    let interval = Duration::from_millis(20);
    let bucket = Arc::new(TokenBucket::new(interval, 8).unwrap());
    let mut writer = RateLimitedWriter::new(Vec::new(), bucket);

    let start = Instant::now();
    writer.write_all(&[0; 8]).unwrap();
    assert!(start.elapsed() < interval, "{:?}", start.elapsed());

    // A second payload waits for the bucket to refill.
    writer.write_all(&[0; 8]).unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= interval * 7, "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert_eq!(writer.into_inner().len(), 16);
}

#[test]
fn threads_share_one_rate() {
    let config = TokenBucketConfig::builder()
        .fill_interval(Duration::from_millis(10))
        .capacity(4)
        .quantum(2)
        .build()
        .unwrap();
    let tb = Arc::new(TokenBucket::from_config(&config));
    assert_eq!(tb.rate(), 200.0);

    let start = Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tb = Arc::clone(&tb);
            std::thread::spawn(move || {
                for _ in 0..3 {
                    tb.wait(2);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // 24 tokens, 4 of them up front: the last 20 take 10 ticks.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[test]
fn sleeping_waiter_does_not_hold_up_others() {
    let interval = Duration::from_millis(200);
    let tb = Arc::new(TokenBucket::new(interval, 1).unwrap());
    assert_eq!(tb.take(1), Duration::ZERO);

    // Five tokens in debt: about a second of sleep.
    let sleeper = {
        let tb = Arc::clone(&tb);
        std::thread::spawn(move || tb.wait(5))
    };
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    assert_eq!(tb.take(0), Duration::ZERO);
    let available = tb.available();
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    assert!(available <= -4, "{available}");
    assert!(!sleeper.is_finished());

    sleeper.join().unwrap();
}
